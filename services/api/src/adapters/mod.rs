pub mod camera;
pub mod db;

pub use camera::FfmpegCameraAdapter;
pub use db::DbAdapter;
