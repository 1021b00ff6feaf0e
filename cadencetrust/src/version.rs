// Client build and system metadata embedded in the hello and login messages.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::handshake::messages::{BuildInfo, Platform, Product, ProductFlags};
use crate::login::{CpuFamily, Os, SystemInfo};

/// Build number reported to the access point.
pub const BUILD_VERSION: u64 = 124_200_290;

/// Identity of this client as reported during the handshake and login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientMetadata {
    /// Human-readable device name; also seeds the default device id.
    pub device_name: String,
    /// Stable device identifier (hex). Derived from the name when empty.
    pub device_id: String,
    /// Build number sent in `BuildInfo`.
    pub build_version: u64,
}

impl Default for ClientMetadata {
    fn default() -> Self {
        Self::new("cadence")
    }
}

impl ClientMetadata {
    /// Metadata for a device with the given name.
    pub fn new(device_name: impl Into<String>) -> Self {
        let device_name = device_name.into();
        Self {
            device_id: device_id_from_name(&device_name),
            device_name,
            build_version: BUILD_VERSION,
        }
    }

    /// `BuildInfo` for the client hello.
    pub fn build_info(&self) -> BuildInfo {
        BuildInfo {
            product: Product::Client as i32,
            product_flags: vec![ProductFlags::None as i32],
            platform: current_platform() as i32,
            version: self.build_version,
        }
    }

    /// `SystemInfo` for the login request.
    pub fn system_info(&self) -> SystemInfo {
        let device_id = if self.device_id.is_empty() {
            device_id_from_name(&self.device_name)
        } else {
            self.device_id.clone()
        };
        SystemInfo {
            cpu_family: current_cpu_family() as i32,
            os: current_os() as i32,
            system_information_string: Some(format!(
                "cadence_{}_{}",
                env!("CARGO_PKG_VERSION"),
                self.device_name
            )),
            device_id: Some(device_id),
        }
    }

    /// Free-form version string for the login request.
    pub fn version_string(&self) -> String {
        format!("cadence-{}", env!("CARGO_PKG_VERSION"))
    }
}

/// Device id = lowercase hex of SHA-1(device name).
pub fn device_id_from_name(name: &str) -> String {
    Sha1::digest(name.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn current_platform() -> Platform {
    match (std::env::consts::OS, std::env::consts::ARCH) {
        ("windows", _) => Platform::Win32X86,
        ("macos", "x86") => Platform::OsxX86,
        ("macos", _) => Platform::OsxX8664,
        ("linux", "x86") => Platform::LinuxX86,
        ("linux", "x86_64") => Platform::LinuxX8664,
        ("linux", "mips") => Platform::LinuxMips,
        ("linux", _) => Platform::LinuxArm,
        ("freebsd", "x86_64") => Platform::FreebsdX8664,
        ("freebsd", _) => Platform::FreebsdX86,
        ("android", _) => Platform::AndroidArm,
        ("ios", _) => Platform::IphoneArm,
        _ => Platform::LinuxX8664,
    }
}

fn current_cpu_family() -> CpuFamily {
    match std::env::consts::ARCH {
        "x86" => CpuFamily::X86,
        "x86_64" => CpuFamily::X8664,
        "arm" | "aarch64" => CpuFamily::Arm,
        "powerpc" => CpuFamily::Ppc,
        "powerpc64" => CpuFamily::Ppc64,
        "mips" | "mips64" => CpuFamily::Mips,
        _ => CpuFamily::Unknown,
    }
}

fn current_os() -> Os {
    match std::env::consts::OS {
        "windows" => Os::Windows,
        "macos" => Os::Osx,
        "ios" => Os::Iphone,
        "linux" => Os::Linux,
        "android" => Os::Android,
        "freebsd" => Os::Freebsd,
        _ => Os::Unknown,
    }
}
