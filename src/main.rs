fn main() {
    if let Err(e) = hexmap_render::core::Viewer::run() {
        eprintln!("Viewer failed: {}", e);
        std::process::exit(1);
    }
}
