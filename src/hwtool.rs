//! Hardware tool types and resolution of `mdb`'s `hwtool` listing.
//!
//! `mdb` selects a programmer by type and by the index it printed in its
//! listing, e.g.
//!
//! ```text
//! 0  MPLAB ICD3 tm  (JIT140210129)
//! 1  MPLAB ICD3 tm  (AB99)
//! ```
//!
//! [`resolve`] turns such a listing plus an optional serial number into the
//! index to pass to `hwtool <TYPE> -p <INDEX>`.

use clap::ValueEnum;
use regex::{Regex, RegexBuilder};
use std::fmt;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Hardware tools `mdb` knows how to attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum HwTool {
    #[value(name = "PICkit3")]
    PicKit3,
    #[value(name = "ICD3")]
    Icd3,
    #[value(name = "RealICE")]
    RealIce,
    #[value(name = "SIM")]
    Sim,
    #[value(name = "PM3")]
    Pm3,
}

impl HwTool {
    pub const ALL: [HwTool; 5] = [
        HwTool::PicKit3,
        HwTool::Icd3,
        HwTool::RealIce,
        HwTool::Sim,
        HwTool::Pm3,
    ];

    /// The name `mdb` expects in `hwtool <TYPE> -p <INDEX>`.
    pub fn as_str(self) -> &'static str {
        match self {
            HwTool::PicKit3 => "PICkit3",
            HwTool::Icd3 => "ICD3",
            HwTool::RealIce => "RealICE",
            HwTool::Sim => "SIM",
            HwTool::Pm3 => "PM3",
        }
    }

    /// Regex fragment matching how the tool is named in the `hwtool` listing.
    ///
    /// Only the ICD3 and PICkit3 listings are known. The other tools have no
    /// entry yet, so they never resolve to an index.
    pub fn display_name_pattern(self) -> Option<&'static str> {
        match self {
            HwTool::Icd3 => Some(r"MPLAB\s+ICD3\s+tm\s*"),
            HwTool::PicKit3 => Some(r"PICkit\s*3\s*"),
            HwTool::RealIce | HwTool::Sim | HwTool::Pm3 => None,
        }
    }

    pub fn is_resolvable(self) -> bool {
        self.display_name_pattern().is_some()
    }
}

impl fmt::Display for HwTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the `hwtool` listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HwToolEntry {
    pub index: String,
    pub serial: String,
}

static LISTING_PATTERNS: LazyLock<Vec<(HwTool, Regex)>> = LazyLock::new(|| {
    HwTool::ALL
        .iter()
        .filter_map(|&tool| {
            let name = tool.display_name_pattern()?;
            let regex = RegexBuilder::new(&format!(
                r"^\s*(?P<index>\d+)\s+{name}\((?P<serial>[^)]+)\)"
            ))
            .case_insensitive(true)
            .multi_line(true)
            .dot_matches_new_line(true)
            .build()
            .expect("static regex must compile");
            Some((tool, regex))
        })
        .collect()
});

fn listing_pattern(tool: HwTool) -> Option<&'static Regex> {
    LISTING_PATTERNS
        .iter()
        .find(|(candidate, _)| *candidate == tool)
        .map(|(_, regex)| regex)
}

/// All entries of type `tool` in `listing`, in the order `mdb` printed them.
pub fn list_entries(tool: HwTool, listing: &str) -> Vec<HwToolEntry> {
    let Some(pattern) = listing_pattern(tool) else {
        return Vec::new();
    };

    pattern
        .captures_iter(listing)
        .map(|caps| HwToolEntry {
            index: caps["index"].to_string(),
            serial: caps["serial"].to_string(),
        })
        .collect()
}

/// Pick the index of the tool to use from an `mdb` `hwtool` listing.
///
/// Without a serial, a listing with exactly one tool of the requested type
/// resolves to that tool. With a serial, the first entry whose serial matches
/// exactly wins. Several attached tools and no serial is never guessed.
pub fn resolve(tool: HwTool, serial: Option<&str>, listing: &str) -> Option<String> {
    if !tool.is_resolvable() {
        warn!(hwtool = %tool, "no listing pattern known for this hardware tool");
        return None;
    }

    let entries = list_entries(tool, listing);
    debug!(hwtool = %tool, found = entries.len(), "parsed hwtool listing");

    let chosen = match (serial, entries.as_slice()) {
        (None, [only]) => Some(only),
        (None, _) => None,
        (Some(serial), entries) => entries.iter().find(|entry| entry.serial == serial),
    };

    chosen.map(|entry| entry.index.clone())
}
