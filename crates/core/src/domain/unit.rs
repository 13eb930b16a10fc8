use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Unit of measure, carried as its UN/ECE Recommendation 20 code.
///
/// Unknown codes are kept verbatim in `Other` so that previously saved lines
/// always load.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum UnitCode {
    #[default]
    Piece,
    Kilogram,
    Ton,
    Liter,
    Meter,
    SquareMeter,
    CubicMeter,
    Kilometer,
    Hour,
    Day,
    Package,
    Box,
    Pallet,
    Other(String),
}

impl UnitCode {
    pub fn code(&self) -> &str {
        match self {
            Self::Piece => "NIU",
            Self::Kilogram => "KGM",
            Self::Ton => "TNE",
            Self::Liter => "LTR",
            Self::Meter => "MTR",
            Self::SquareMeter => "MTK",
            Self::CubicMeter => "MTQ",
            Self::Kilometer => "KMT",
            Self::Hour => "HUR",
            Self::Day => "DAY",
            Self::Package => "PA",
            Self::Box => "BX",
            Self::Pallet => "PAL",
            Self::Other(code) => code,
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "NIU" | "C62" => Self::Piece,
            "KGM" => Self::Kilogram,
            "TNE" => Self::Ton,
            "LTR" => Self::Liter,
            "MTR" => Self::Meter,
            "MTK" => Self::SquareMeter,
            "MTQ" => Self::CubicMeter,
            "KMT" => Self::Kilometer,
            "HUR" => Self::Hour,
            "DAY" => Self::Day,
            "PA" => Self::Package,
            "BX" => Self::Box,
            "PAL" => Self::Pallet,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for UnitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for UnitCode {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(value))
    }
}

impl Serialize for UnitCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for UnitCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}
