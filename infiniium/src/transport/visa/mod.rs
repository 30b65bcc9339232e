//! VISA transport. The VISA shared library is loaded at runtime, so the crate
//! builds and runs without it as long as only raw sockets are used.

pub use asynced::VisaTransport;
pub use visa_sys::{load, Instrument, Visa};

mod asynced;
mod visa_sys;

cfg_if::cfg_if! {
    if #[cfg(all(windows, target_pointer_width = "64"))] {
        pub const DEFAULT_VISA_LIBRARY: &str = "visa64.dll";
    } else if #[cfg(windows)] {
        pub const DEFAULT_VISA_LIBRARY: &str = "visa32.dll";
    } else if #[cfg(target_os = "macos")] {
        pub const DEFAULT_VISA_LIBRARY: &str = "/Library/Frameworks/VISA.framework/VISA";
    } else {
        pub const DEFAULT_VISA_LIBRARY: &str = "libvisa.so";
    }
}
