//! Device identification from the User-Agent header
//!
//! Used when an inspection upload does not name its device. Produces labels
//! such as `iPhone - iOS 17.1 - Safari` or `Windows - 10/11 - Chrome`.

/// Device id used when neither a form field nor a User-Agent is present
pub const UNKNOWN_DEVICE: &str = "unknown";

/// Describe the device behind a User-Agent string
pub fn describe_device(user_agent: &str) -> String {
    let ua = user_agent.to_ascii_lowercase();
    let mut parts: Vec<String> = Vec::new();

    if ua.contains("iphone") || ua.contains("ipad") {
        parts.push(if ua.contains("iphone") { "iPhone" } else { "iPad" }.to_string());
        if let Some(version) = token_after(&ua, "os ", &[' ']) {
            parts.push(format!("iOS {}", version.replace('_', ".")));
        }
    } else if ua.contains("android") {
        parts.push("Android".to_string());
        if let Some(version) = token_after(&ua, "android ", &[';', ')']) {
            parts.push(version.trim().to_string());
        }
        let brands = [
            ("samsung", "Samsung"),
            ("huawei", "Huawei"),
            ("xiaomi", "Xiaomi"),
            ("oppo", "Oppo"),
            ("oneplus", "OnePlus"),
        ];
        if let Some((_, brand)) = brands.iter().find(|(needle, _)| ua.contains(needle)) {
            parts.push(brand.to_string());
        }
    } else if ua.contains("windows") {
        parts.push("Windows".to_string());
        let versions = [
            ("windows nt 10", "10/11"),
            ("windows nt 6.3", "8.1"),
            ("windows nt 6.2", "8"),
            ("windows nt 6.1", "7"),
        ];
        if let Some((_, version)) = versions.iter().find(|(needle, _)| ua.contains(needle)) {
            parts.push(version.to_string());
        }
    } else if ua.contains("mac os x") || ua.contains("macintosh") {
        parts.push("macOS".to_string());
        if let Some(version) = token_after(&ua, "mac os x ", &[')', ';']) {
            parts.push(version.replace('_', "."));
        }
    } else if ua.contains("linux") {
        parts.push("Linux".to_string());
        if ua.contains("ubuntu") {
            parts.push("Ubuntu".to_string());
        }
    }

    if ua.contains("edg") {
        parts.push("Edge".to_string());
    } else if ua.contains("chrome") {
        parts.push("Chrome".to_string());
    } else if ua.contains("firefox") {
        parts.push("Firefox".to_string());
    } else if ua.contains("safari") {
        parts.push("Safari".to_string());
    }

    if !parts.is_empty() {
        return parts.join(" - ");
    }

    if ua.contains("mobile") {
        "Mobile".to_string()
    } else if ua.contains("tablet") {
        "Tablet".to_string()
    } else {
        "Desktop".to_string()
    }
}

/// Text following `marker` up to the first terminator, if non-empty
fn token_after<'a>(haystack: &'a str, marker: &str, terminators: &[char]) -> Option<&'a str> {
    let start = haystack.find(marker)? + marker.len();
    let rest = &haystack[start..];
    let end = rest.find(terminators).unwrap_or(rest.len());
    let token = &rest[..end];
    (!token.trim().is_empty()).then_some(token)
}

/// Device id for an inspection: explicit value first, then the User-Agent
pub fn resolve_device_id(explicit: Option<&str>, user_agent: Option<&str>) -> String {
    if let Some(id) = explicit.map(str::trim).filter(|id| !id.is_empty()) {
        return id.to_string();
    }
    match user_agent.map(str::trim).filter(|ua| !ua.is_empty()) {
        Some(ua) => describe_device(ua),
        None => UNKNOWN_DEVICE.to_string(),
    }
}
