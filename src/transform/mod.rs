mod bridge;

pub use bridge::TransformBridge;
