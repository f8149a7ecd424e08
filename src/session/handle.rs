use crate::error::{Error, Result};
use crate::media::SourceSelector;
use crate::session::{Command, EventSender, SessionEvent};

/// Cloneable command surface of a running session
#[derive(Clone)]
pub struct SessionHandle {
    tx: EventSender,
}

impl SessionHandle {
    pub(crate) fn new(tx: EventSender) -> Self {
        Self { tx }
    }

    pub fn join(&self, room: impl Into<String>) -> Result<()> {
        self.command(Command::Join(room.into()))
    }

    pub fn join_random(&self) -> Result<()> {
        self.command(Command::JoinRandom)
    }

    pub fn leave(&self) -> Result<()> {
        self.command(Command::Leave)
    }

    pub fn toggle_mic(&self) -> Result<()> {
        self.command(Command::ToggleMic)
    }

    pub fn toggle_camera(&self) -> Result<()> {
        self.command(Command::ToggleCamera)
    }

    pub fn switch_source(&self, selector: SourceSelector) -> Result<()> {
        self.command(Command::SwitchSource(selector))
    }

    pub fn send_chat(&self, text: impl Into<String>) -> Result<()> {
        self.command(Command::SendChat(text.into()))
    }

    /// Leave (if in a room) and stop the session task.
    pub fn shutdown(&self) -> Result<()> {
        self.command(Command::Shutdown)
    }

    fn command(&self, command: Command) -> Result<()> {
        self.tx
            .send(SessionEvent::Command(command))
            .map_err(|_| Error::Transport("session is not running".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_commands_are_queued_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = SessionHandle::new(tx);

        handle.join("r1@rooms.io").expect("Should queue join");
        handle.send_chat("hello").expect("Should queue chat");

        assert!(matches!(
            rx.try_recv(),
            Ok(SessionEvent::Command(Command::Join(ref room))) if room == "r1@rooms.io"
        ));
        assert!(matches!(
            rx.try_recv(),
            Ok(SessionEvent::Command(Command::SendChat(ref text))) if text == "hello"
        ));
    }

    #[test]
    fn test_stopped_session_reports_error() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let handle = SessionHandle::new(tx);

        assert!(matches!(handle.leave(), Err(Error::Transport(_))));
    }
}
