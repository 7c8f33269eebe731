//! The `mdb` commands the flash sequence sends.

use crate::hwtool::HwTool;
use std::fmt;
use std::path::Path;

/// A single `mdb` command line.
///
/// [`Display`](fmt::Display) renders the command as typed; [`line`](Self::line)
/// adds the terminating newline `mdb` waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MdbCommand<'a> {
    /// `hwtool`: list the attached hardware tools.
    ListHwTools,
    /// `device <MCU>`
    Device(&'a str),
    /// Select memory ranges by hand instead of letting `mdb` guess.
    ManualMemRanges,
    /// Include EEPROM when programming. Automatic range selection on the
    /// PICkit3 leaves non-empty EEPROM out.
    IncludeEeprom,
    /// `hwtool <TYPE> -p <INDEX>`
    SelectHwTool { tool: HwTool, index: &'a str },
    /// Answer a "Do you wish to continue?" question.
    Confirm,
    /// `program "<image>"`
    Program(&'a Path),
    Quit,
}

impl MdbCommand<'_> {
    pub fn line(&self) -> String {
        format!("{self}\n")
    }
}

impl fmt::Display for MdbCommand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MdbCommand::ListHwTools => f.write_str("hwtool"),
            MdbCommand::Device(mcu) => write!(f, "device {mcu}"),
            MdbCommand::ManualMemRanges => f.write_str("set AutoSelectMemRanges manual"),
            MdbCommand::IncludeEeprom => f.write_str("set memories.eeprom true"),
            MdbCommand::SelectHwTool { tool, index } => write!(f, "hwtool {tool} -p {index}"),
            MdbCommand::Confirm => f.write_str("yes"),
            MdbCommand::Program(image) => write!(f, "program \"{}\"", image.display()),
            MdbCommand::Quit => f.write_str("quit"),
        }
    }
}
