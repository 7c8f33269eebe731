//! The flash sequence: select the device and the hardware tool, program the
//! image, then check what `mdb` reported.

use crate::command::MdbCommand;
use crate::error::SessionError;
use crate::hwtool::{self, HwTool};
use crate::scanner::CapturedBlock;
use crate::session::PromptSession;
use regex::{Regex, RegexBuilder};
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, error, info, warn};

fn block_pattern(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .multi_line(true)
        .dot_matches_new_line(true)
        .build()
        .expect("static regex must compile")
}

static CONFIRMATION_RE: LazyLock<Regex> =
    LazyLock::new(|| block_pattern(r"Do you .* to continue\?"));
static VERIFY_COMPLETE_RE: LazyLock<Regex> =
    LazyLock::new(|| block_pattern(r"Programming/Verify complete"));
static PROGRAM_SUCCEEDED_RE: LazyLock<Regex> =
    LazyLock::new(|| block_pattern(r"Program\s+succeeded"));

/// Does `mdb` ask whether to continue, e.g. after a tool firmware update warning?
pub fn asks_confirmation(block: &str) -> bool {
    CONFIRMATION_RE.is_match(block)
}

/// Did `mdb` report both a completed program/verify cycle and success?
pub fn program_succeeded(block: &str) -> bool {
    VERIFY_COMPLETE_RE.is_match(block) && PROGRAM_SUCCEEDED_RE.is_match(block)
}

/// What to flash, and with which tool.
#[derive(Debug, Clone)]
pub struct FlashPlan {
    pub image: PathBuf,
    pub mcu: String,
    pub hwtool: HwTool,
    pub hwtool_serial: Option<String>,
    /// Pause between a finished `program` and `quit`. The PICkit3 is still
    /// writing EEPROM when `mdb` reports success, and quitting right away
    /// corrupts it.
    pub settle_delay: Duration,
}

/// How a flash run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashOutcome {
    Programmed,
    HwToolNotFound,
    ProgramFailed,
    /// `mdb` exited before the sequence finished.
    SessionClosed,
}

impl FlashOutcome {
    pub fn is_success(self) -> bool {
        self == FlashOutcome::Programmed
    }

    pub fn exit_code(self) -> u8 {
        if self.is_success() { 0 } else { 1 }
    }
}

/// Run the flash sequence over `session`, then ask `mdb` to quit.
///
/// `quit` is attempted however the sequence ended, including on error. If
/// `mdb` does not finish after `quit` the shutdown error is returned, so the
/// caller knows the child is still running.
pub async fn run<S>(session: &mut S, plan: &FlashPlan) -> Result<FlashOutcome, SessionError>
where
    S: PromptSession + ?Sized,
{
    let result = drive(session, plan).await;

    match session.send_final(&MdbCommand::Quit.line()).await {
        Ok(()) => result,
        Err(err) => {
            warn!(error = %err, "mdb did not finish after quit");
            // The sequence error, if any, is the one worth reporting.
            result.and(Err(err))
        }
    }
}

macro_rules! next_block {
    ($handoff:expr) => {
        match $handoff.into_block() {
            Some(block) => block,
            None => {
                warn!("mdb exited before the flash sequence finished");
                return Ok(FlashOutcome::SessionClosed);
            }
        }
    };
}

async fn drive<S>(session: &mut S, plan: &FlashPlan) -> Result<FlashOutcome, SessionError>
where
    S: PromptSession + ?Sized,
{
    next_block!(session.await_first_prompt().await?);

    let listing = next_block!(session.send_and_await(&MdbCommand::ListHwTools.line()).await?);
    let Some(index) = hwtool::resolve(plan.hwtool, plan.hwtool_serial.as_deref(), &listing.text())
    else {
        error!(
            hwtool = %plan.hwtool,
            serial = plan.hwtool_serial.as_deref().unwrap_or("<any>"),
            "No hwtool available"
        );
        return Ok(FlashOutcome::HwToolNotFound);
    };
    info!(hwtool = %plan.hwtool, index = %index, "hardware tool resolved");

    next_block!(session.send_and_await(&MdbCommand::Device(&plan.mcu).line()).await?);
    next_block!(session.send_and_await(&MdbCommand::ManualMemRanges.line()).await?);
    next_block!(session.send_and_await(&MdbCommand::IncludeEeprom.line()).await?);

    let select = MdbCommand::SelectHwTool {
        tool: plan.hwtool,
        index: &index,
    };
    let mut selected = next_block!(session.send_and_await(&select.line()).await?);
    if asks_confirmation(&selected.text()) {
        debug!("mdb asks for confirmation");
        selected = next_block!(session.send_and_await(&MdbCommand::Confirm.line()).await?);
    }
    debug!(bytes = selected.len(), "hardware tool selected");

    let report = next_block!(
        session
            .send_and_await(&MdbCommand::Program(&plan.image).line())
            .await?
    );
    let outcome = evaluate(&report);

    if !plan.settle_delay.is_zero() {
        debug!(delay = ?plan.settle_delay, "letting the tool settle before quitting");
        tokio::time::sleep(plan.settle_delay).await;
    }

    Ok(outcome)
}

fn evaluate(report: &CapturedBlock) -> FlashOutcome {
    if program_succeeded(&report.text()) {
        info!("program succeeded");
        FlashOutcome::Programmed
    } else {
        error!("programming failed");
        FlashOutcome::ProgramFailed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Handoff;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    /// Replays canned hand-offs and records what was sent.
    #[derive(Default)]
    struct FakeSession {
        handoffs: VecDeque<Handoff>,
        sent: Vec<String>,
        finals: Vec<String>,
        quit_timeout: Option<Duration>,
    }

    impl FakeSession {
        fn new(blocks: &[&str]) -> Self {
            Self {
                handoffs: blocks
                    .iter()
                    .map(|b| Handoff::Prompt(CapturedBlock::from(*b)))
                    .collect(),
                ..Self::default()
            }
        }

        fn next(&mut self) -> Handoff {
            self.handoffs.pop_front().unwrap_or(Handoff::Closed)
        }
    }

    #[async_trait(?Send)]
    impl PromptSession for FakeSession {
        async fn await_first_prompt(&mut self) -> Result<Handoff, SessionError> {
            Ok(self.next())
        }

        async fn send_and_await(&mut self, command: &str) -> Result<Handoff, SessionError> {
            self.sent.push(command.to_string());
            Ok(self.next())
        }

        async fn send_final(&mut self, command: &str) -> Result<(), SessionError> {
            self.finals.push(command.to_string());
            match self.quit_timeout {
                Some(limit) => Err(SessionError::PromptTimeout(limit)),
                None => Ok(()),
            }
        }
    }

    const LISTING: &str = "Available tools:\n0  MPLAB ICD3 tm  (JIT140210129)\n1  MPLAB ICD3 tm  (AB99)\n>";
    const SUCCESS: &str = "Programming...\nProgramming/Verify complete\nProgram succeeded.\n>";

    fn plan() -> FlashPlan {
        FlashPlan {
            image: PathBuf::from("/fw/app.hex"),
            mcu: "PIC18F87K90".into(),
            hwtool: HwTool::Icd3,
            hwtool_serial: Some("AB99".into()),
            settle_delay: Duration::ZERO,
        }
    }

    fn expected_sequence() -> Vec<&'static str> {
        vec![
            "hwtool\n",
            "device PIC18F87K90\n",
            "set AutoSelectMemRanges manual\n",
            "set memories.eeprom true\n",
            "hwtool ICD3 -p 1\n",
            "program \"/fw/app.hex\"\n",
        ]
    }

    #[tokio::test]
    async fn test_successful_flash() {
        let mut session = FakeSession::new(&[">", LISTING, ">", ">", ">", "Connected\n>", SUCCESS]);
        let outcome = run(&mut session, &plan()).await.unwrap();

        assert_eq!(outcome, FlashOutcome::Programmed);
        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(session.sent, expected_sequence());
        assert_eq!(session.finals, vec!["quit\n"]);
    }

    #[tokio::test]
    async fn test_confirmation_answered_once() {
        let question = "Target device ID does not match.\nDo you wish to continue? (yes/no)\n>";
        let mut session =
            FakeSession::new(&[">", LISTING, ">", ">", ">", question, "Connected\n>", SUCCESS]);
        let outcome = run(&mut session, &plan()).await.unwrap();

        let mut expected = expected_sequence();
        expected.insert(5, "yes\n");
        assert_eq!(outcome, FlashOutcome::Programmed);
        assert_eq!(session.sent, expected);
    }

    #[tokio::test]
    async fn test_missing_verify_marker_fails() {
        let mut session =
            FakeSession::new(&[">", LISTING, ">", ">", ">", ">", "Program succeeded.\n>"]);
        let outcome = run(&mut session, &plan()).await.unwrap();

        assert_eq!(outcome, FlashOutcome::ProgramFailed);
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(session.finals, vec!["quit\n"]);
    }

    #[tokio::test]
    async fn test_unresolved_tool_quits_early() {
        let mut session = FakeSession::new(&[">", "No tools found\n>"]);
        let outcome = run(&mut session, &plan()).await.unwrap();

        assert_eq!(outcome, FlashOutcome::HwToolNotFound);
        assert_eq!(session.sent, vec!["hwtool\n"]);
        assert_eq!(session.finals, vec!["quit\n"]);
    }

    #[tokio::test]
    async fn test_ambiguous_tool_without_serial() {
        let mut session = FakeSession::new(&[">", LISTING]);
        let plan = FlashPlan {
            hwtool_serial: None,
            ..plan()
        };
        let outcome = run(&mut session, &plan).await.unwrap();
        assert_eq!(outcome, FlashOutcome::HwToolNotFound);
    }

    #[tokio::test]
    async fn test_tool_exit_mid_sequence() {
        let mut session = FakeSession::new(&[">", LISTING, ">"]);
        let outcome = run(&mut session, &plan()).await.unwrap();

        assert_eq!(outcome, FlashOutcome::SessionClosed);
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(session.sent.len(), 3);
        assert_eq!(session.finals, vec!["quit\n"]);
    }

    #[tokio::test]
    async fn test_hung_quit_is_reported() {
        let mut session = FakeSession::new(&[">", LISTING, ">", ">", ">", ">", SUCCESS]);
        session.quit_timeout = Some(Duration::from_millis(500));
        let result = run(&mut session, &plan()).await;

        assert!(matches!(result, Err(SessionError::PromptTimeout(_))));
        assert_eq!(session.finals, vec!["quit\n"]);
    }

    #[tokio::test]
    async fn test_tool_exit_before_first_prompt() {
        let mut session = FakeSession::new(&[]);
        let outcome = run(&mut session, &plan()).await.unwrap();
        assert_eq!(outcome, FlashOutcome::SessionClosed);
        assert!(session.sent.is_empty());
    }

    #[test]
    fn test_success_markers() {
        assert!(program_succeeded(SUCCESS));
        assert!(program_succeeded("PROGRAMMING/VERIFY COMPLETE\nprogram   succeeded\n>"));
        assert!(!program_succeeded("Program succeeded.\n>"));
        assert!(!program_succeeded("Programming/Verify complete\n>"));
        assert!(!program_succeeded("Program failed.\n>"));
    }

    #[test]
    fn test_confirmation_question() {
        assert!(asks_confirmation("Warning\nDo you wish to continue?\n>"));
        assert!(asks_confirmation("do you really want\nto continue?"));
        assert!(!asks_confirmation("Programmer to target power is enabled\n>"));
    }
}
