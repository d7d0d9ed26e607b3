pub mod camera;
pub mod output;
pub mod scan;
pub mod session;
pub mod settings;
