use bytes::Bytes;
use pcmlink_frame::{FrameError, StreamPlan, StreamSource, TestSetup};

/// Synthetic payload for the FPGA test core.
///
/// Tests 0 and 1 send `packet_count` DATA frames of exactly
/// `payload_length` bytes counting up from zero (wrapping), then STOP.
/// Any other test number only sends START and lets the FPGA drive the rest.
#[derive(Debug, Clone)]
pub struct TestPattern {
    setup: TestSetup,
    packets_sent: u8,
    next_value: u8,
}

impl TestPattern {
    pub fn new(setup: TestSetup) -> Self {
        Self {
            setup,
            packets_sent: 0,
            next_value: 0,
        }
    }

    pub fn setup(&self) -> &TestSetup {
        &self.setup
    }

    pub fn packets_sent(&self) -> u8 {
        self.packets_sent
    }
}

impl StreamSource for TestPattern {
    fn setup_payload(&mut self) -> pcmlink_frame::Result<Bytes> {
        Ok(Bytes::copy_from_slice(&self.setup.to_bytes()))
    }

    fn plan(&self) -> StreamPlan {
        match self.setup.test_number {
            0 | 1 if self.setup.packet_count > 0 => StreamPlan::StreamThenStop,
            0 | 1 => StreamPlan::StopOnly,
            _ => StreamPlan::SetupOnly,
        }
    }

    fn min_chunk(&self) -> usize {
        usize::from(self.setup.payload_length)
    }

    fn fill(&mut self, buf: &mut [u8]) -> pcmlink_frame::Result<usize> {
        if self.packets_sent == self.setup.packet_count {
            return Ok(0);
        }
        let n = usize::from(self.setup.payload_length);
        if buf.len() < n {
            return Err(FrameError::FrameTooLarge {
                requested: n,
                max: buf.len(),
            });
        }

        for byte in &mut buf[..n] {
            *byte = self.next_value;
            self.next_value = self.next_value.wrapping_add(1);
        }
        self.packets_sent += 1;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use pcmlink_frame::{CommandKind, CommandSet, HeaderCodec, ProtocolForm, TxFramer};

    use super::*;

    fn test_codec() -> HeaderCodec {
        HeaderCodec::new(ProtocolForm::Narrow, CommandSet::Test)
    }

    fn setup(test_number: u8, payload_length: u8, packet_count: u8) -> TestSetup {
        TestSetup {
            test_number,
            payload_length,
            packet_count,
        }
    }

    fn wire(tx: &mut TxFramer<TestPattern>, budget: usize) -> Vec<u8> {
        let mut out = BytesMut::new();
        let codec = *tx.codec();
        while !tx.is_done() {
            if let Some(frame) = tx.next_frame(budget).unwrap() {
                frame.encode(&codec, &mut out).unwrap();
            }
        }
        out.to_vec()
    }

    #[test]
    fn test_one_streams_fixed_packets() {
        let mut tx = TxFramer::new(TestPattern::new(setup(1, 3, 2)), test_codec());
        assert_eq!(
            wire(&mut tx, 63),
            vec![0x03, 1, 3, 2, 0x43, 0, 1, 2, 0x43, 3, 4, 5, 0x80]
        );
    }

    #[test]
    fn packets_keep_their_size_under_large_budgets() {
        let mut tx = TxFramer::new(TestPattern::new(setup(0, 10, 3)), test_codec());
        tx.next_frame(63).unwrap();
        for _ in 0..3 {
            let frame = tx.next_frame(63).unwrap().unwrap();
            assert_eq!(frame.kind, CommandKind::StreamOutput);
            assert_eq!(frame.payload.len(), 10);
        }
        assert!(tx.next_frame(63).unwrap().is_none());
        assert_eq!(tx.next_frame(63).unwrap().unwrap().kind, CommandKind::Stop);
    }

    #[test]
    fn zero_packets_skip_to_stop() {
        let mut tx = TxFramer::new(TestPattern::new(setup(0, 8, 0)), test_codec());
        assert_eq!(wire(&mut tx, 63), vec![0x03, 0, 8, 0, 0x80]);
    }

    #[test]
    fn other_tests_send_only_start() {
        let mut tx = TxFramer::new(TestPattern::new(setup(2, 8, 4)), test_codec());
        assert_eq!(wire(&mut tx, 63), vec![0x03, 2, 8, 4]);
        assert_eq!(tx.source().packets_sent(), 0);
    }

    #[test]
    fn sequence_wraps_across_packets() {
        let mut pattern = TestPattern::new(setup(1, 200, 2));
        let mut buf = [0u8; 200];
        pattern.fill(&mut buf).unwrap();
        assert_eq!(buf[199], 199);
        pattern.fill(&mut buf).unwrap();
        assert_eq!(buf[55], 255);
        assert_eq!(buf[56], 0);
        assert_eq!(pattern.fill(&mut buf).unwrap(), 0);
    }
}
