use std::process::Command;

fn main() {
    // Priority: CI env var > git command > "unknown"
    let commit = std::env::var("BUILD_COMMIT").unwrap_or_else(|_| {
        Command::new("git")
            .args(["rev-parse", "--short", "HEAD"])
            .output()
            .ok()
            .filter(|output| output.status.success())
            .and_then(|output| String::from_utf8(output.stdout).ok())
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    });

    let build_date =
        std::env::var("BUILD_DATE").unwrap_or_else(|_| chrono::Utc::now().to_rfc3339());

    let rustc_version = rustc_version::version()
        .map(|v| v.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    for (key, value) in [
        ("BUILD_COMMIT", commit.as_str()),
        ("BUILD_DATE", build_date.as_str()),
        ("RUSTC_VERSION", rustc_version.as_str()),
    ] {
        println!("cargo:rustc-env={key}={value}");
    }

    for trigger in [
        "cargo:rerun-if-changed=.git/HEAD",
        "cargo:rerun-if-env-changed=BUILD_COMMIT",
        "cargo:rerun-if-env-changed=BUILD_DATE",
    ] {
        println!("{trigger}");
    }
}
