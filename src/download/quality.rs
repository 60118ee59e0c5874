use std::str::FromStr;

use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Video quality tiers offered to the user.
///
/// Anything the client sends outside the known tiers is served as [`Quality::P360`];
/// that fallback is policy, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, AsRefStr, EnumString, EnumIter)]
pub enum Quality {
    #[strum(serialize = "1080")]
    P1080,
    #[strum(serialize = "720")]
    P720,
    #[default]
    #[strum(serialize = "360")]
    P360,
}

impl Quality {
    /// Parses client input such as `"720"` or `"720p"`, falling back to 360p.
    pub fn from_input(input: &str) -> Self {
        let trimmed = input.trim();
        let digits = trimmed.strip_suffix(['p', 'P']).unwrap_or(trimmed);
        Self::from_str(digits).unwrap_or_else(|_| {
            log::debug!("Unknown quality '{}', using {}p", input, Self::default());
            Self::default()
        })
    }

    /// yt-dlp `-f` expression selecting this tier.
    pub fn format_expression(self) -> &'static str {
        match self {
            Quality::P1080 => "bestvideo[height<=1080]+bestaudio/best[height<=1080]",
            Quality::P720 => "bestvideo[height<=720]+bestaudio/best[height<=720]",
            // 360p progressive streams usually carry audio already
            Quality::P360 => "best[height<=360]",
        }
    }

    /// Numeric label used in display titles, e.g. `"720"`.
    pub fn label(self) -> &'static str {
        match self {
            Quality::P1080 => "1080",
            Quality::P720 => "720",
            Quality::P360 => "360",
        }
    }
}
