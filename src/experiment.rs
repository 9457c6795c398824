pub const SLUG: &str = "DigitsRecognition";
pub const NAME: &str = "Digits Recognition (MLP)";
pub const DESCRIPTION: &str = "Hand-written digits recognition using MLP (Multilayer Perceptron)";

pub const APP_ID: &str = "io.github.ml_experiments.DigitsRecognition";

pub const CANVAS_WIDTH: i32 = 200;
pub const CANVAS_HEIGHT: i32 = 200;
