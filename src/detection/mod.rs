pub mod controller;
mod feed;
mod loop_worker;

pub use controller::DetectionController;
pub use feed::PoseFeed;
pub use loop_worker::detection_loop;
