pub mod cascade_face_locator;
pub mod haar_cascade;
pub mod integral_image;
pub mod math;
