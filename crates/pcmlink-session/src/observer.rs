use pcmlink_frame::RxEvent;
use tracing::trace;

use crate::error::{Result, SessionError};

/// Receives every event the RX framer decodes, in wire order.
pub trait RxObserver {
    fn on_event(&mut self, event: RxEvent) -> Result<()>;
}

impl<O: RxObserver + ?Sized> RxObserver for &mut O {
    fn on_event(&mut self, event: RxEvent) -> Result<()> {
        (**self).on_event(event)
    }
}

impl<O: RxObserver + ?Sized> RxObserver for Box<O> {
    fn on_event(&mut self, event: RxEvent) -> Result<()> {
        (**self).on_event(event)
    }
}

/// Drops every event. Audio playback only cares about the stop status,
/// which the driver tracks itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct IgnoreEvents;

impl RxObserver for IgnoreEvents {
    fn on_event(&mut self, _event: RxEvent) -> Result<()> {
        Ok(())
    }
}

/// Checks that FPGA_DATA bytes count up from zero, wrapping at 255.
#[derive(Debug, Default, Clone)]
pub struct SequenceVerifier {
    next: u8,
    verified: u64,
    loopback: u64,
}

impl SequenceVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// DATA bytes that matched so far.
    pub fn verified(&self) -> u64 {
        self.verified
    }

    /// LOOPBACK bytes seen (not checked).
    pub fn loopback_bytes(&self) -> u64 {
        self.loopback
    }
}

impl RxObserver for SequenceVerifier {
    fn on_event(&mut self, event: RxEvent) -> Result<()> {
        match event {
            RxEvent::Data(got) => {
                if got != self.next {
                    return Err(SessionError::SequenceMismatch {
                        expected: self.next,
                        got,
                    });
                }
                trace!(value = got, "data byte");
                self.next = self.next.wrapping_add(1);
                self.verified += 1;
            }
            RxEvent::Loopback(_) => self.loopback += 1,
            RxEvent::Stopped(_) => {}
        }
        Ok(())
    }
}

/// Collects every event.
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    events: Vec<RxEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[RxEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<RxEvent> {
        self.events
    }
}

impl RxObserver for EventLog {
    fn on_event(&mut self, event: RxEvent) -> Result<()> {
        self.events.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifier_accepts_wrapping_sequence() {
        let mut verifier = SequenceVerifier::new();
        for i in 0..600u32 {
            verifier.on_event(RxEvent::Data(i as u8)).unwrap();
        }
        verifier.on_event(RxEvent::Loopback(0x33)).unwrap();
        verifier.on_event(RxEvent::Stopped(0)).unwrap();
        assert_eq!(verifier.verified(), 600);
        assert_eq!(verifier.loopback_bytes(), 1);
    }

    #[test]
    fn verifier_reports_first_mismatch() {
        let mut verifier = SequenceVerifier::new();
        verifier.on_event(RxEvent::Data(0)).unwrap();
        let err = verifier.on_event(RxEvent::Data(5)).unwrap_err();
        assert!(matches!(
            err,
            SessionError::SequenceMismatch {
                expected: 1,
                got: 5
            }
        ));
    }

    #[test]
    fn event_log_keeps_order() {
        let mut log = EventLog::new();
        let observer: &mut dyn RxObserver = &mut log;
        observer.on_event(RxEvent::Data(7)).unwrap();
        observer.on_event(RxEvent::Stopped(0)).unwrap();
        assert_eq!(
            log.into_events(),
            vec![RxEvent::Data(7), RxEvent::Stopped(0)]
        );
    }
}
