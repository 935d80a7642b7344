use std::path::PathBuf;

fn main() {
    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(stereohud_lib::default_config_path);

    if let Err(e) = stereohud_lib::run(&config_path) {
        log::error!("[RUNTIME] {}", e);
        eprintln!("stereohud: {}", e);
        std::process::exit(1);
    }
}
