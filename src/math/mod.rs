//! # Math Module
//!
//! The 3D math the visibility core needs: vectors, a 4x4 matrix, and the
//! geometric primitives used for culling and light assignment. Conversions
//! to and from `glam` are provided for interop with the host engine.

mod box3;
mod frustum;
mod matrix4;
mod plane;
mod sphere;
mod vector3;
mod vector4;

pub use box3::Box3;
pub use frustum::Frustum;
pub use matrix4::Matrix4;
pub use plane::Plane;
pub use sphere::Sphere;
pub use vector3::Vector3;
pub use vector4::Vector4;
