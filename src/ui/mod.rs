pub mod canvas;
pub mod window;
