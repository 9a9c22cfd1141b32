pub mod beam;
pub mod refraction;
