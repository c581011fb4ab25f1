mod main_loop;
mod scene;
mod svg_exporter;

pub use main_loop::start;
