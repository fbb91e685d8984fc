//! Regex-based User-Agent parsing
//!
//! Covers the browsers, platforms and engines seen on the marketplace.
//! Anything not matched stays [`Detected::Unknown`].

use regex::Regex;

use crate::models::{Detected, DeviceInfo};

struct Rule {
    pattern: Regex,
    name: &'static str,
}

impl Rule {
    fn new(pattern: &str, name: &'static str) -> Result<Self, regex::Error> {
        Ok(Rule {
            pattern: Regex::new(pattern)?,
            name,
        })
    }
}

/// Parses User-Agent strings into [`DeviceInfo`]
///
/// Rules are checked in order and the first match wins, so more specific
/// products (Edge, Opera, Samsung Internet) come before the engines they
/// embed (Chrome, Safari).
pub struct UserAgentParser {
    browsers: Vec<Rule>,
    systems: Vec<Rule>,
    engines: Vec<Rule>,
    samsung_model: Regex,
    pixel_model: Regex,
    android_model: Regex,
}

impl UserAgentParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(UserAgentParser {
            browsers: vec![
                Rule::new(r"Edg(?:e|A|iOS)?/([\d.]+)", "Edge")?,
                Rule::new(r"(?:OPR|Opera)/([\d.]+)", "Opera")?,
                Rule::new(r"SamsungBrowser/([\d.]+)", "Samsung Internet")?,
                Rule::new(r"(?:Firefox|FxiOS)/([\d.]+)", "Firefox")?,
                Rule::new(r"(?:CriOS|Chrome)/([\d.]+)", "Chrome")?,
                Rule::new(r"Version/([\d.]+).*Safari/", "Safari")?,
                Rule::new(r"MSIE ([\d.]+)", "IE")?,
                Rule::new(r"Trident/.*rv:([\d.]+)", "IE")?,
            ],
            systems: vec![
                Rule::new(r"Windows NT ([\d.]+)", "Windows")?,
                Rule::new(r"(?:iPhone|iPad|iPod).*?OS ([\d_]+)", "iOS")?,
                Rule::new(r"Android ?([\d.]*)", "Android")?,
                Rule::new(r"CrOS \w+ ([\d.]+)", "Chrome OS")?,
                Rule::new(r"Mac OS X ?([\d_.]*)", "Mac OS")?,
                Rule::new(r"Linux()", "Linux")?,
            ],
            engines: vec![
                Rule::new(r"Edge/([\d.]+)", "EdgeHTML")?,
                Rule::new(r"Trident/([\d.]+)", "Trident")?,
                Rule::new(r"Presto/([\d.]+)", "Presto")?,
                Rule::new(r"Chrome/([\d.]+)", "Blink")?,
                Rule::new(r"AppleWebKit/([\d.]+)", "WebKit")?,
                Rule::new(r"rv:([\w.]+).*Gecko/", "Gecko")?,
            ],
            samsung_model: Regex::new(r"\b(SM-[A-Z0-9]+)")?,
            pixel_model: Regex::new(r"\b(Pixel [\w ]+?)(?: Build|[;)])")?,
            android_model: Regex::new(r"Android[^;]*; ([^;)]+?)(?: Build/[^;)]*)?\)")?,
        })
    }

    pub fn parse(&self, user_agent: &str) -> DeviceInfo {
        let mut info = DeviceInfo::default();
        if user_agent.trim().is_empty() {
            return info;
        }

        if let Some((name, version)) = first_match(&self.browsers, user_agent) {
            info.browser_name = Detected::Known(name.to_string());
            info.browser_version = Detected::from_text(version);
        }

        if let Some((name, version)) = first_match(&self.systems, user_agent) {
            let version = match name {
                "Windows" => windows_release(&version),
                "iOS" | "Mac OS" => version.replace('_', "."),
                _ => version,
            };
            info.os_name = Detected::Known(name.to_string());
            info.os_version = Detected::from_text(version);
        }

        if let Some((name, version)) = first_match(&self.engines, user_agent) {
            info.engine_name = Detected::Known(name.to_string());
            info.engine_version = Detected::from_text(version);
        }

        self.parse_device(user_agent, &mut info);
        info
    }

    fn parse_device(&self, ua: &str, info: &mut DeviceInfo) {
        let known = |s: &str| Detected::Known(s.to_string());

        if ua.contains("iPad") {
            info.device_type = known("tablet");
            info.device_vendor = known("Apple");
            info.device_model = known("iPad");
        } else if ua.contains("iPhone") {
            info.device_type = known("mobile");
            info.device_vendor = known("Apple");
            info.device_model = known("iPhone");
        } else if ua.contains("iPod") {
            info.device_type = known("mobile");
            info.device_vendor = known("Apple");
            info.device_model = known("iPod touch");
        } else if ua.contains("Android") {
            info.device_type = if ua.contains("Mobile") {
                known("mobile")
            } else {
                known("tablet")
            };

            if let Some(caps) = self.samsung_model.captures(ua) {
                info.device_vendor = known("Samsung");
                info.device_model = Detected::from_text(&caps[1]);
            } else if let Some(caps) = self.pixel_model.captures(ua) {
                info.device_vendor = known("Google");
                info.device_model = Detected::from_text(&caps[1]);
            } else if let Some(caps) = self.android_model.captures(ua) {
                let model = caps[1].trim();
                // Reduced UAs report a placeholder model
                if model != "K" {
                    info.device_model = Detected::from_text(model);
                }
            }
        } else if ua.contains("SmartTV") || ua.contains("SMART-TV") || ua.contains("Web0S") {
            info.device_type = known("smarttv");
        } else if ua.contains("Mobile") {
            info.device_type = known("mobile");
        }
    }
}

fn first_match(rules: &[Rule], ua: &str) -> Option<(&'static str, String)> {
    rules.iter().find_map(|rule| {
        rule.pattern.captures(ua).map(|caps| {
            let version = caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
            (rule.name, version)
        })
    })
}

/// Map an NT kernel version to the marketing release name
fn windows_release(nt_version: &str) -> String {
    match nt_version {
        "10.0" => "10",
        "6.3" => "8.1",
        "6.2" => "8",
        "6.1" => "7",
        "6.0" => "Vista",
        "5.1" | "5.2" => "XP",
        other => other,
    }
    .to_string()
}
