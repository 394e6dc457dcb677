use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::codec::{Frame, HeaderCodec};
use crate::error::{FrameError, Result};
use crate::protocol::CommandKind;

/// What follows the setup frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamPlan {
    /// Stream payload until the source is exhausted, then STOP.
    #[default]
    StreamThenStop,
    /// No payload; STOP right after setup.
    StopOnly,
    /// Setup only. The device decides when the session ends.
    SetupOnly,
}

/// A producer of stream payload bytes.
pub trait StreamSource {
    /// Payload of the SETUP_OUTPUT (or test START) frame.
    fn setup_payload(&mut self) -> Result<Bytes>;

    /// How the session continues after setup.
    fn plan(&self) -> StreamPlan {
        StreamPlan::StreamThenStop
    }

    /// Smallest payload worth sending. Budgets below this are skipped.
    fn min_chunk(&self) -> usize {
        1
    }

    /// Copy up to `buf.len()` payload bytes into `buf`.
    ///
    /// Returns the number of bytes written; 0 means the source is exhausted.
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize>;
}

impl<S: StreamSource + ?Sized> StreamSource for &mut S {
    fn setup_payload(&mut self) -> Result<Bytes> {
        (**self).setup_payload()
    }

    fn plan(&self) -> StreamPlan {
        (**self).plan()
    }

    fn min_chunk(&self) -> usize {
        (**self).min_chunk()
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).fill(buf)
    }
}

impl<S: StreamSource + ?Sized> StreamSource for Box<S> {
    fn setup_payload(&mut self) -> Result<Bytes> {
        (**self).setup_payload()
    }

    fn plan(&self) -> StreamPlan {
        (**self).plan()
    }

    fn min_chunk(&self) -> usize {
        (**self).min_chunk()
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).fill(buf)
    }
}

/// Host-side transmit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    AwaitSetup,
    Streaming,
    AwaitStop,
    Done,
}

impl TxState {
    pub fn name(self) -> &'static str {
        match self {
            TxState::AwaitSetup => "await-setup",
            TxState::Streaming => "streaming",
            TxState::AwaitStop => "await-stop",
            TxState::Done => "done",
        }
    }
}

/// Turns a [`StreamSource`] into host frames.
///
/// The framer never writes anything itself. The caller asks for the next
/// frame with the payload budget it can currently afford and is responsible
/// for putting the returned frame on the wire in one piece.
pub struct TxFramer<S> {
    source: S,
    state: TxState,
    codec: HeaderCodec,
    scratch: BytesMut,
    frames: u64,
    stream_bytes: u64,
}

impl<S: StreamSource> TxFramer<S> {
    pub fn new(source: S, codec: HeaderCodec) -> Self {
        Self {
            source,
            state: TxState::AwaitSetup,
            codec,
            scratch: BytesMut::new(),
            frames: 0,
            stream_bytes: 0,
        }
    }

    /// Produce the next frame, or `None` if there is nothing to send this turn.
    ///
    /// `max_payload` bounds the payload of a STREAM_OUTPUT frame. Control
    /// frames (setup, stop) ignore it.
    pub fn next_frame(&mut self, max_payload: usize) -> Result<Option<Frame>> {
        match self.state {
            TxState::AwaitSetup => self.setup_frame().map(Some),
            TxState::Streaming => self.stream_frame(max_payload),
            TxState::AwaitStop => {
                self.transition(TxState::Done);
                Ok(Some(self.count(Frame::empty(CommandKind::Stop))))
            }
            TxState::Done => Ok(None),
        }
    }

    fn setup_frame(&mut self) -> Result<Frame> {
        let payload = self.source.setup_payload()?;
        let max = self.codec.max_payload();
        if payload.len() > max {
            return Err(FrameError::FrameTooLarge {
                requested: payload.len(),
                max,
            });
        }

        let next = match self.source.plan() {
            StreamPlan::StreamThenStop => TxState::Streaming,
            StreamPlan::StopOnly => TxState::AwaitStop,
            StreamPlan::SetupOnly => TxState::Done,
        };
        self.transition(next);
        Ok(self.count(Frame::new(CommandKind::SetupOutput, payload)))
    }

    fn stream_frame(&mut self, max_payload: usize) -> Result<Option<Frame>> {
        let max = self.codec.max_payload();
        if max_payload > max {
            return Err(FrameError::FrameTooLarge {
                requested: max_payload,
                max,
            });
        }
        let min_chunk = self.source.min_chunk().max(1);
        if min_chunk > max {
            return Err(FrameError::FrameTooLarge {
                requested: min_chunk,
                max,
            });
        }
        if max_payload < min_chunk {
            return Ok(None);
        }

        self.scratch.clear();
        self.scratch.resize(max_payload, 0);
        let n = self.source.fill(&mut self.scratch)?.min(max_payload);
        if n == 0 {
            debug!(
                stream_bytes = self.stream_bytes,
                "stream source exhausted"
            );
            self.transition(TxState::AwaitStop);
            return Ok(None);
        }

        self.scratch.truncate(n);
        let payload = self.scratch.split().freeze();
        self.stream_bytes += n as u64;
        Ok(Some(self.count(Frame::new(CommandKind::StreamOutput, payload))))
    }

    fn count(&mut self, frame: Frame) -> Frame {
        self.frames += 1;
        frame
    }

    fn transition(&mut self, next: TxState) {
        debug!(from = self.state.name(), to = next.name(), "tx state");
        self.state = next;
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == TxState::Done
    }

    /// Frames produced so far, control frames included.
    pub fn frames_produced(&self) -> u64 {
        self.frames
    }

    /// Stream payload bytes produced so far.
    pub fn stream_bytes(&self) -> u64 {
        self.stream_bytes
    }

    pub fn codec(&self) -> &HeaderCodec {
        &self.codec
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }
}

impl<S> std::fmt::Debug for TxFramer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxFramer")
            .field("state", &self.state)
            .field("codec", &self.codec)
            .field("frames", &self.frames)
            .field("stream_bytes", &self.stream_bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CommandSet, ProtocolForm};

    struct VecSource {
        data: Vec<u8>,
        pos: usize,
        plan: StreamPlan,
        min_chunk: usize,
        fills: usize,
    }

    impl VecSource {
        fn new(data: Vec<u8>) -> Self {
            Self {
                data,
                pos: 0,
                plan: StreamPlan::StreamThenStop,
                min_chunk: 1,
                fills: 0,
            }
        }
    }

    impl StreamSource for VecSource {
        fn setup_payload(&mut self) -> Result<Bytes> {
            Ok(Bytes::from_static(&[0x11]))
        }

        fn plan(&self) -> StreamPlan {
            self.plan
        }

        fn min_chunk(&self) -> usize {
            self.min_chunk
        }

        fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
            self.fills += 1;
            let n = buf.len().min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    struct FailingSetup;

    impl StreamSource for FailingSetup {
        fn setup_payload(&mut self) -> Result<Bytes> {
            Err(FrameError::UnsupportedSampleRate(22_050))
        }

        fn fill(&mut self, _buf: &mut [u8]) -> Result<usize> {
            Ok(0)
        }
    }

    fn narrow() -> HeaderCodec {
        HeaderCodec::new(ProtocolForm::Narrow, CommandSet::Audio)
    }

    #[test]
    fn setup_frame_first() {
        let mut tx = TxFramer::new(VecSource::new(vec![1, 2, 3]), narrow());
        let frame = tx.next_frame(63).unwrap().unwrap();
        assert_eq!(frame.kind, CommandKind::SetupOutput);
        assert_eq!(frame.payload.as_ref(), &[0x11]);

        let mut wire = BytesMut::new();
        frame.encode(tx.codec(), &mut wire).unwrap();
        assert_eq!(&wire[..], &[0x01, 0x11]);
        assert_eq!(tx.state(), TxState::Streaming);
    }

    #[test]
    fn streams_exact_bytes_over_varying_budgets() {
        let data: Vec<u8> = (0..500u32).map(|i| (i * 7) as u8).collect();
        let mut tx = TxFramer::new(VecSource::new(data.clone()), narrow());
        tx.next_frame(63).unwrap().unwrap();

        let budgets = [1usize, 63, 0, 17, 40, 2, 63, 5];
        let mut streamed = Vec::new();
        let mut stops = 0;
        let mut turn = 0;
        while !tx.is_done() {
            let budget = budgets[turn % budgets.len()];
            turn += 1;
            if let Some(frame) = tx.next_frame(budget).unwrap() {
                match frame.kind {
                    CommandKind::StreamOutput => {
                        assert!(frame.payload.len() <= budget);
                        assert!(!frame.payload.is_empty());
                        streamed.extend_from_slice(&frame.payload);
                    }
                    CommandKind::Stop => {
                        assert!(frame.payload.is_empty());
                        stops += 1;
                    }
                    other => panic!("unexpected frame {other}"),
                }
            }
        }

        assert_eq!(streamed, data);
        assert_eq!(stops, 1);
        assert_eq!(tx.stream_bytes(), 500);
    }

    #[test]
    fn done_is_idempotent() {
        let mut tx = TxFramer::new(VecSource::new(vec![9]), narrow());
        tx.next_frame(63).unwrap();
        tx.next_frame(63).unwrap();
        assert!(tx.next_frame(63).unwrap().is_none());
        assert_eq!(tx.state(), TxState::AwaitStop);
        assert_eq!(tx.next_frame(63).unwrap().unwrap().kind, CommandKind::Stop);

        for _ in 0..5 {
            assert!(tx.next_frame(63).unwrap().is_none());
        }
        assert!(tx.is_done());
        assert_eq!(tx.frames_produced(), 3);
    }

    #[test]
    fn zero_budget_is_not_exhaustion() {
        let mut tx = TxFramer::new(VecSource::new(vec![1, 2]), narrow());
        tx.next_frame(63).unwrap();

        assert!(tx.next_frame(0).unwrap().is_none());
        assert_eq!(tx.state(), TxState::Streaming);
        assert_eq!(tx.source().fills, 0);
    }

    #[test]
    fn budget_below_min_chunk_waits() {
        let mut source = VecSource::new(vec![0; 32]);
        source.min_chunk = 16;
        let mut tx = TxFramer::new(source, narrow());
        tx.next_frame(63).unwrap();

        assert!(tx.next_frame(15).unwrap().is_none());
        assert_eq!(tx.state(), TxState::Streaming);
        let frame = tx.next_frame(16).unwrap().unwrap();
        assert_eq!(frame.payload.len(), 16);
    }

    #[test]
    fn oversized_budget_fails() {
        let mut tx = TxFramer::new(VecSource::new(vec![1]), narrow());
        tx.next_frame(63).unwrap();
        let err = tx.next_frame(64).unwrap_err();
        assert!(matches!(
            err,
            FrameError::FrameTooLarge {
                requested: 64,
                max: 63
            }
        ));
    }

    #[test]
    fn min_chunk_over_form_maximum_fails() {
        let mut source = VecSource::new(vec![0; 40]);
        source.min_chunk = 40;
        let codec = HeaderCodec::new(ProtocolForm::Wide, CommandSet::Test);
        let mut tx = TxFramer::new(source, codec);
        tx.next_frame(31).unwrap();
        assert!(matches!(
            tx.next_frame(31),
            Err(FrameError::FrameTooLarge { requested: 40, .. })
        ));
    }

    #[test]
    fn stop_only_plan_skips_streaming() {
        let mut source = VecSource::new(vec![1, 2, 3]);
        source.plan = StreamPlan::StopOnly;
        let mut tx = TxFramer::new(source, narrow());

        assert_eq!(
            tx.next_frame(63).unwrap().unwrap().kind,
            CommandKind::SetupOutput
        );
        assert_eq!(tx.next_frame(63).unwrap().unwrap().kind, CommandKind::Stop);
        assert!(tx.is_done());
        assert_eq!(tx.source().fills, 0);
    }

    #[test]
    fn setup_only_plan_ends_after_setup() {
        let mut source = VecSource::new(vec![1, 2, 3]);
        source.plan = StreamPlan::SetupOnly;
        let mut tx = TxFramer::new(source, narrow());

        tx.next_frame(63).unwrap().unwrap();
        assert!(tx.is_done());
        assert!(tx.next_frame(63).unwrap().is_none());
    }

    #[test]
    fn setup_error_never_reaches_streaming() {
        let mut tx = TxFramer::new(FailingSetup, narrow());
        assert!(matches!(
            tx.next_frame(63),
            Err(FrameError::UnsupportedSampleRate(22_050))
        ));
        assert_eq!(tx.state(), TxState::AwaitSetup);
        assert_eq!(tx.frames_produced(), 0);
    }

    #[test]
    fn extended_form_streams_large_frames() {
        let data = vec![0x5a; 5000];
        let codec = HeaderCodec::new(ProtocolForm::WideExtended, CommandSet::Audio);
        let mut tx = TxFramer::new(VecSource::new(data), codec);
        tx.next_frame(4096).unwrap();

        let frame = tx.next_frame(4096).unwrap().unwrap();
        assert_eq!(frame.payload.len(), 4096);
        assert_eq!(frame.wire_size(&codec), 4099);
        let frame = tx.next_frame(4096).unwrap().unwrap();
        assert_eq!(frame.payload.len(), 904);
    }
}
