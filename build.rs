fn main() {
    // Rebuild when the embedded recorder page changes.
    println!("cargo:rerun-if-changed=web");
}
