pub mod face_geometry;
pub mod face_locator;
