use std::time::{SystemTime, UNIX_EPOCH};

const BUILD_TIME_ENV: &str = "WOOF_BUILD_UNIX_TIME";

fn main() {
    // Identification responses report when this crate was built.
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);

    println!("cargo:rustc-env={BUILD_TIME_ENV}={seconds}");
    println!("cargo:rerun-if-changed=src");
}
