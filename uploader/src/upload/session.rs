//! State of one resumable upload session.
//!
//! ```text
//! Initiated ──ack──▶ InProgress(offset) ──ack──▶ InProgress(offset') ──complete──▶ Completed
//!     │                     │
//!     └───────fail──────────┴──────────────────────────────────────────────────▶ Failed
//! ```
//!
//! Transitions never move backwards and never leave a terminal state. A rejected transition
//! leaves the session exactly as it was.

use crate::youtube_api::SessionHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// The platform has issued a session handle; no bytes have been acknowledged.
    Initiated,
    /// `offset` bytes have been acknowledged.
    InProgress { offset: u64 },
    /// Every byte has been acknowledged and the platform assigned `video_id`.
    Completed { video_id: String },
    Failed { reason: String },
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed { .. } | SessionStatus::Failed { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("session is already {0:?}")]
    Terminal(SessionStatus),

    #[error("acknowledgement went backwards from {acknowledged} to {received} bytes")]
    Regressed { acknowledged: u64, received: u64 },

    #[error("acknowledgement of {received} bytes exceeds the {total} byte upload")]
    Overflow { received: u64, total: u64 },
}

#[derive(Debug, Clone)]
pub struct UploadSession {
    handle: SessionHandle,
    total_length: u64,
    acknowledged: u64,
    status: SessionStatus,
}

impl UploadSession {
    pub fn new(handle: SessionHandle, total_length: u64) -> Self {
        Self {
            handle,
            total_length,
            acknowledged: 0,
            status: SessionStatus::Initiated,
        }
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    /// Cumulative bytes the platform has acknowledged; also the offset of the next byte to send.
    pub fn acknowledged(&self) -> u64 {
        self.acknowledged
    }

    pub fn remaining(&self) -> u64 {
        self.total_length - self.acknowledged
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.status.is_terminal() {
            return Err(SessionError::Terminal(self.status.clone()));
        }
        Ok(())
    }

    /// Records that the platform has persisted `received` bytes.
    ///
    /// Re-acknowledging the current offset is allowed (the platform made no progress).
    pub fn acknowledge(&mut self, received: u64) -> Result<(), SessionError> {
        self.ensure_open()?;
        if received < self.acknowledged {
            return Err(SessionError::Regressed {
                acknowledged: self.acknowledged,
                received,
            });
        }
        if received > self.total_length {
            return Err(SessionError::Overflow {
                received,
                total: self.total_length,
            });
        }
        self.acknowledged = received;
        self.status = SessionStatus::InProgress { offset: received };
        Ok(())
    }

    /// Records the final acknowledgement, which covers every byte of the upload.
    pub fn complete(&mut self, video_id: String) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.acknowledged = self.total_length;
        self.status = SessionStatus::Completed { video_id };
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.status = SessionStatus::Failed {
            reason: reason.into(),
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn session(total: u64) -> UploadSession {
        UploadSession::new(SessionHandle::new("https://upload.example/session"), total)
    }

    #[test]
    fn happy_path() {
        let mut s = session(100);
        assert_eq!(s.status(), &SessionStatus::Initiated);
        assert_eq!(s.acknowledged(), 0);

        s.acknowledge(40).unwrap();
        assert_eq!(s.status(), &SessionStatus::InProgress { offset: 40 });
        assert_eq!(s.remaining(), 60);

        s.acknowledge(40).unwrap();
        s.acknowledge(80).unwrap();
        s.complete("abc123".into()).unwrap();
        assert_eq!(
            s.status(),
            &SessionStatus::Completed {
                video_id: "abc123".into()
            }
        );
        assert_eq!(s.acknowledged(), s.total_length());
    }

    #[test]
    fn acknowledgement_never_regresses() {
        let mut s = session(100);
        s.acknowledge(50).unwrap();
        assert_eq!(
            s.acknowledge(49),
            Err(SessionError::Regressed {
                acknowledged: 50,
                received: 49
            })
        );
        assert_eq!(s.acknowledged(), 50);
        assert_eq!(s.status(), &SessionStatus::InProgress { offset: 50 });
    }

    #[test]
    fn acknowledgement_never_exceeds_total() {
        let mut s = session(100);
        assert_eq!(
            s.acknowledge(101),
            Err(SessionError::Overflow {
                received: 101,
                total: 100
            })
        );
        assert_eq!(s.status(), &SessionStatus::Initiated);
        s.acknowledge(100).unwrap();
    }

    #[test]
    fn terminal_states_are_final() {
        let mut s = session(10);
        s.complete("id".into()).unwrap();
        assert!(matches!(s.acknowledge(10), Err(SessionError::Terminal(_))));
        assert!(matches!(s.fail("late"), Err(SessionError::Terminal(_))));
        assert!(matches!(
            s.complete("other".into()),
            Err(SessionError::Terminal(_))
        ));

        let mut s = session(10);
        s.acknowledge(5).unwrap();
        s.fail("boom").unwrap();
        assert!(s.status().is_terminal());
        assert!(matches!(s.acknowledge(6), Err(SessionError::Terminal(_))));
        assert!(matches!(
            s.complete("id".into()),
            Err(SessionError::Terminal(_))
        ));
        assert_eq!(s.acknowledged(), 5);
    }

    #[test]
    fn fail_from_initiated() {
        let mut s = session(10);
        s.fail("rejected").unwrap();
        assert_eq!(
            s.status(),
            &SessionStatus::Failed {
                reason: "rejected".into()
            }
        );
    }
}
