// This binary crate is intentionally minimal.
// All model-building logic lives in the library (src/lib.rs and its modules),
// and the HTTP service lives in the `backend` binary:
//   cargo run --bin backend
fn main() {
    println!("trellis-nn: declarative neural networks from project configs.");
    println!("Run `cargo run --bin backend` to start the project service.");
}
