use std::collections::HashMap;

/// A passive service announcement as received from the network.
#[derive(Clone, PartialEq, Debug)]
pub struct Announcement {
    pub host: String,
    pub properties: HashMap<String, String>,
}

impl Announcement {
    pub fn new(host: &str, properties: &[(&str, &str)]) -> Self {
        Announcement {
            host: host.to_string(),
            properties: properties.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    pub fn serial(&self) -> Option<&str> {
        self.property("serial")
    }

    pub fn model(&self) -> Option<&str> {
        self.property("model")
    }

    fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str).filter(|value| !value.is_empty())
    }

    pub fn is_ipv6(&self) -> bool {
        self.host.contains(':')
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum AbortReason {
    MissingSerialOrHost,
    Ipv6Address,
    UnknownEntry,
}

impl AbortReason {
    pub fn code(&self) -> &'static str {
        match self {
            AbortReason::MissingSerialOrHost => "missing_serial_or_host",
            AbortReason::Ipv6Address => "ipv6_address",
            AbortReason::UnknownEntry => "unknown_entry",
        }
    }
}

/// Checks that an announcement can lead to a registration and returns its serial.
pub fn applicable_serial(announcement: &Announcement) -> Result<&str, AbortReason> {
    let serial = match announcement.serial() {
        Some(serial) if !announcement.host.is_empty() => serial,
        _ => return Err(AbortReason::MissingSerialOrHost),
    };

    if announcement.is_ipv6() {
        return Err(AbortReason::Ipv6Address);
    }

    Ok(serial)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Announcement::new("10.0.0.5", &[("serial", "S1")]), Ok("S1"))]
    #[case(Announcement::new("10.0.0.5", &[("model", "v3")]), Err(AbortReason::MissingSerialOrHost))]
    #[case(Announcement::new("10.0.0.5", &[("serial", "")]), Err(AbortReason::MissingSerialOrHost))]
    #[case(Announcement::new("", &[("serial", "S1")]), Err(AbortReason::MissingSerialOrHost))]
    #[case(Announcement::new("fe80::1", &[("serial", "S1")]), Err(AbortReason::Ipv6Address))]
    fn applicable_serial_filters_announcements(#[case] announcement: Announcement, #[case] expected: Result<&str, AbortReason>) {
        assert_eq!(applicable_serial(&announcement), expected);
    }
}
