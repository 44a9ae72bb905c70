// rust-embed bakes the page template and static assets into the binary at
// compile time. Cargo does not track those files on its own, so rerun the
// build whenever they change.

fn main() {
    println!("cargo:rerun-if-changed=src/assets/");
    println!("cargo:rerun-if-changed=templates/");
}
