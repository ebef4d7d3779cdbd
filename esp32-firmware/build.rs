use std::process::Command;

/// UTC wall-clock time of this build, shown in the node's boot log.
fn build_timestamp() -> String {
    Command::new("date")
        .args(["-u", "+%Y-%m-%dT%H:%M:%SZ"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|s| s.trim().to_owned())
        .unwrap_or_else(|| "unknown".to_owned())
}

fn main() {
    embuild::espidf::sysenv::output();

    println!("cargo:rustc-env=BUILD_TIMESTAMP={}", build_timestamp());

    // broker address and TLS identity are baked into the image
    for input in [".env", "certs", "build.rs"] {
        println!("cargo:rerun-if-changed={input}");
    }
}
