#[cfg(any(target_os = "linux", target_os = "macos"))]
pub mod channel;
pub mod tcp;
