//! Command tables and header forms.
//!
//! Commands are identified by a 2-bit code. In the narrow form the code sits
//! in bits[7:6] and the length in bits[5:0]. The wide forms use a 3-bit kind
//! field in bits[7:5] whose low bit is always zero, so the 2-bit code still
//! lands in bits[7:6]; a kind field with bit 5 set is not a command.

use std::fmt;

/// Length field value announcing two big-endian length bytes (wide extended form).
pub const EXTENDED_LENGTH: u8 = 0x10;

/// On-wire header layout. Fixed per deployment, never negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolForm {
    /// 1 byte: kind bits[7:6], length bits[5:0] (0..=63).
    #[default]
    Narrow,
    /// 1 byte: kind bits[7:5], length bits[4:0] (0..=31).
    Wide,
    /// Wide header whose length field may hold [`EXTENDED_LENGTH`], followed
    /// by a big-endian u16 length (0..=65535).
    WideExtended,
}

impl ProtocolForm {
    /// Largest payload a single frame can carry.
    pub const fn max_payload(self) -> usize {
        match self {
            ProtocolForm::Narrow => 0x3f,
            ProtocolForm::Wide => 0x1f,
            ProtocolForm::WideExtended => u16::MAX as usize,
        }
    }

    /// Mask of the inline length field.
    pub const fn length_mask(self) -> u8 {
        match self {
            ProtocolForm::Narrow => 0x3f,
            ProtocolForm::Wide | ProtocolForm::WideExtended => 0x1f,
        }
    }

    /// Largest header this form can produce.
    pub const fn max_header_len(self) -> usize {
        match self {
            ProtocolForm::Narrow | ProtocolForm::Wide => 1,
            ProtocolForm::WideExtended => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ProtocolForm::Narrow => "narrow",
            ProtocolForm::Wide => "wide",
            ProtocolForm::WideExtended => "wide-extended",
        }
    }
}

impl fmt::Display for ProtocolForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which end of the link sends a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    HostToDevice,
    DeviceToHost,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::HostToDevice => f.write_str("host->device"),
            Direction::DeviceToHost => f.write_str("device->host"),
        }
    }
}

/// Every command the protocol knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Host: configure the output (START in the test command set).
    SetupOutput,
    /// Host: PCM or test payload.
    StreamOutput,
    /// Host: no more payload will follow.
    Stop,
    /// Device: test data generated by the FPGA.
    FpgaData,
    /// Device: payload echoed back by the FPGA.
    FpgaLoopback,
    /// Device: session finished; one status byte follows.
    FpgaStopped,
}

impl CommandKind {
    pub const fn direction(self) -> Direction {
        match self {
            CommandKind::SetupOutput | CommandKind::StreamOutput | CommandKind::Stop => {
                Direction::HostToDevice
            }
            CommandKind::FpgaData | CommandKind::FpgaLoopback | CommandKind::FpgaStopped => {
                Direction::DeviceToHost
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CommandKind::SetupOutput => "SETUP_OUTPUT",
            CommandKind::StreamOutput => "STREAM_OUTPUT",
            CommandKind::Stop => "STOP",
            CommandKind::FpgaData => "FPGA_DATA",
            CommandKind::FpgaLoopback => "FPGA_LOOPBACK",
            CommandKind::FpgaStopped => "FPGA_STOPPED",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const AUDIO_HOST: [(u8, CommandKind); 3] = [
    (0b00, CommandKind::SetupOutput),
    (0b10, CommandKind::StreamOutput),
    (0b11, CommandKind::Stop),
];

const TEST_HOST: [(u8, CommandKind); 3] = [
    (0b00, CommandKind::SetupOutput),
    (0b01, CommandKind::StreamOutput),
    (0b10, CommandKind::Stop),
];

const DEVICE: [(u8, CommandKind); 3] = [
    (0b01, CommandKind::FpgaData),
    (0b10, CommandKind::FpgaLoopback),
    (0b11, CommandKind::FpgaStopped),
];

/// Host->device code table. The FPGA audio core and the FPGA test core
/// assign different codes to the same three host commands; the
/// device->host table is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandSet {
    #[default]
    Audio,
    Test,
}

impl CommandSet {
    fn table(self, direction: Direction) -> &'static [(u8, CommandKind)] {
        match (self, direction) {
            (CommandSet::Audio, Direction::HostToDevice) => &AUDIO_HOST,
            (CommandSet::Test, Direction::HostToDevice) => &TEST_HOST,
            (_, Direction::DeviceToHost) => &DEVICE,
        }
    }

    /// 2-bit wire code of `kind`.
    pub fn code(self, kind: CommandKind) -> u8 {
        self.table(kind.direction())
            .iter()
            .find(|(_, k)| *k == kind)
            .map(|(code, _)| *code)
            .unwrap_or_default()
    }

    /// Command named by a 2-bit wire code, if any.
    pub fn kind(self, direction: Direction, code: u8) -> Option<CommandKind> {
        self.table(direction)
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, kind)| *kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_host_codes_match_command_bytes() {
        assert_eq!(CommandSet::Audio.code(CommandKind::SetupOutput) << 6, 0x00);
        assert_eq!(CommandSet::Audio.code(CommandKind::StreamOutput) << 6, 0x80);
        assert_eq!(CommandSet::Audio.code(CommandKind::Stop) << 6, 0xc0);
    }

    #[test]
    fn test_host_codes_match_command_bytes() {
        assert_eq!(CommandSet::Test.code(CommandKind::SetupOutput) << 6, 0x00);
        assert_eq!(CommandSet::Test.code(CommandKind::StreamOutput) << 6, 0x40);
        assert_eq!(CommandSet::Test.code(CommandKind::Stop) << 6, 0x80);
    }

    #[test]
    fn device_table_is_shared() {
        for set in [CommandSet::Audio, CommandSet::Test] {
            assert_eq!(
                set.kind(Direction::DeviceToHost, 0b11),
                Some(CommandKind::FpgaStopped)
            );
            assert_eq!(set.kind(Direction::DeviceToHost, 0b00), None);
        }
    }

    #[test]
    fn every_kind_roundtrips_through_its_code() {
        let kinds = [
            CommandKind::SetupOutput,
            CommandKind::StreamOutput,
            CommandKind::Stop,
            CommandKind::FpgaData,
            CommandKind::FpgaLoopback,
            CommandKind::FpgaStopped,
        ];
        for set in [CommandSet::Audio, CommandSet::Test] {
            for kind in kinds {
                let code = set.code(kind);
                assert_eq!(set.kind(kind.direction(), code), Some(kind));
            }
        }
    }

    #[test]
    fn form_limits() {
        assert_eq!(ProtocolForm::Narrow.max_payload(), 63);
        assert_eq!(ProtocolForm::Wide.max_payload(), 31);
        assert_eq!(ProtocolForm::WideExtended.max_payload(), 65535);
        assert_eq!(ProtocolForm::WideExtended.max_header_len(), 3);
    }
}
