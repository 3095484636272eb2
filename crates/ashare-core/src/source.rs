use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Upstream data providers. The lowercase name is what appears in
/// `source_chain` and on the `--source` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Tencent,
    Eastmoney,
    Sina,
}

impl ProviderId {
    pub const ALL: [Self; 3] = [Self::Tencent, Self::Eastmoney, Self::Sina];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tencent => "tencent",
            Self::Eastmoney => "eastmoney",
            Self::Sina => "sina",
        }
    }

    /// Name the provider goes by on its own site.
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Tencent => "腾讯财经",
            Self::Eastmoney => "东方财富",
            Self::Sina => "新浪财经",
        }
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tencent" | "qq" => Ok(Self::Tencent),
            "eastmoney" | "em" => Ok(Self::Eastmoney),
            "sina" => Ok(Self::Sina),
            other => Err(ValidationError::InvalidSource {
                value: other.to_owned(),
            }),
        }
    }
}
