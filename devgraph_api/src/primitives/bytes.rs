use std::{
    fmt::Display,
    num::ParseIntError,
    ops::{Add, AddAssign, Sub},
    str::FromStr,
};

const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];

/// A size in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteCount(pub u64);

impl From<u64> for ByteCount {
    fn from(x: u64) -> Self {
        ByteCount(x)
    }
}

impl ByteCount {
    pub const fn from_kib(v: u64) -> Self {
        ByteCount(v << 10)
    }

    pub const fn from_mib(v: u64) -> Self {
        ByteCount(v << 20)
    }

    pub const fn from_gib(v: u64) -> Self {
        ByteCount(v << 30)
    }

    pub fn bytes(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn saturating_sub(self, other: ByteCount) -> ByteCount {
        ByteCount(self.0.saturating_sub(other.0))
    }

    /// Compact form used in documents: the largest binary suffix that
    /// represents the value exactly.
    pub fn to_human_readable(&self) -> String {
        match self.0.trailing_zeros() {
            _ if self.0 == 0 => "0".to_owned(),
            0..=9 => format!("{}", self.0),
            10..=19 => format!("{}K", self.0 >> 10),
            20..=29 => format!("{}M", self.0 >> 20),
            30..=39 => format!("{}G", self.0 >> 30),
            _ => format!("{}T", self.0 >> 40),
        }
    }

    pub fn from_human_readable(mut s: &str) -> Result<Self, ParseIntError> {
        s = s.trim();
        let try_parse = |val: &str, shift: u8| Ok(Self(val.trim().parse::<u64>()? << shift));
        if let Some(p) = s.strip_suffix('K') {
            try_parse(p, 10)
        } else if let Some(p) = s.strip_suffix('M') {
            try_parse(p, 20)
        } else if let Some(p) = s.strip_suffix('G') {
            try_parse(p, 30)
        } else if let Some(p) = s.strip_suffix('T') {
            try_parse(p, 40)
        } else {
            try_parse(s, 0)
        }
    }

    /// Rounded form used in action descriptions, e.g. "10.00 GiB".
    pub fn to_binary_units(&self) -> String {
        if self.0 < 1024 {
            return format!("{} B", self.0);
        }

        let mut unit = 0;
        let mut value = self.0 as f64;
        while value >= 1024.0 && unit < UNITS.len() - 1 {
            value /= 1024.0;
            unit += 1;
        }

        format!("{:.2} {}", value, UNITS[unit])
    }
}

impl Add for ByteCount {
    type Output = ByteCount;

    fn add(self, rhs: ByteCount) -> ByteCount {
        ByteCount(self.0 + rhs.0)
    }
}

impl AddAssign for ByteCount {
    fn add_assign(&mut self, rhs: ByteCount) {
        self.0 += rhs.0;
    }
}

impl Sub for ByteCount {
    type Output = ByteCount;

    fn sub(self, rhs: ByteCount) -> ByteCount {
        ByteCount(self.0 - rhs.0)
    }
}

impl Display for ByteCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_binary_units())
    }
}

impl FromStr for ByteCount {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_human_readable(s.trim())
    }
}

/// Accepts sizes as a string with an optional suffix ("1G", "512") or as a
/// plain number. XML documents only ever provide strings.
struct ByteCountVisitor;

impl<'de> serde::de::Visitor<'de> for ByteCountVisitor {
    type Value = ByteCount;

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "a byte count such as 512, \"4K\" or \"10G\"")
    }

    fn visit_str<E>(self, value: &str) -> Result<ByteCount, E>
    where
        E: serde::de::Error,
    {
        ByteCount::from_human_readable(value)
            .map_err(|e| E::custom(format!("invalid byte count '{value}': {e}")))
    }

    fn visit_u64<E>(self, value: u64) -> Result<ByteCount, E>
    where
        E: serde::de::Error,
    {
        Ok(ByteCount(value))
    }

    fn visit_i64<E>(self, value: i64) -> Result<ByteCount, E>
    where
        E: serde::de::Error,
    {
        u64::try_from(value)
            .map(ByteCount)
            .map_err(|_| E::custom(format!("invalid byte count {value}, expected unsigned integer")))
    }
}

impl<'de> serde::Deserialize<'de> for ByteCount {
    fn deserialize<D>(deserializer: D) -> Result<ByteCount, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_any(ByteCountVisitor)
    }
}

impl serde::Serialize for ByteCount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if self.0 & 0x3FF != 0 {
            serializer.serialize_u64(self.0)
        } else {
            serializer.serialize_str(self.to_human_readable().as_str())
        }
    }
}
