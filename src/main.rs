mod platform;

fn main() {
    if let Err(err) = platform::start() {
        eprintln!("error: {:?}", err);
        std::process::exit(1);
    }
}
