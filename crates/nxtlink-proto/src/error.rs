/// Errors raised while building or decoding telegrams.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtoError {
    #[error("motor {0} out of range (0..=2)")]
    MotorOutOfRange(i32),

    #[error("power {0} out of range (-100..=100)")]
    PowerOutOfRange(i32),

    #[error("sensor port {0} out of range (0..=3)")]
    PortOutOfRange(i32),

    /// A telegram is shorter than its opcode's fixed layout.
    #[error("telegram for opcode {opcode:#04x} too short ({len} bytes, need {need})")]
    TooShort { opcode: u8, len: usize, need: usize },

    /// The reply does not answer the request that was sent.
    #[error("unexpected reply (type {telegram_type:#04x}, opcode {opcode:#04x})")]
    UnexpectedReply { telegram_type: u8, opcode: u8 },

    /// The brick reported a non-zero status byte.
    #[error("brick returned status {status:#04x} for opcode {opcode:#04x}")]
    Status { opcode: u8, status: u8 },

    /// A successful LS read that carried no data bytes.
    #[error("brick returned no data for opcode {opcode:#04x}")]
    NoData { opcode: u8 },

    #[error("unknown command (class {class:#04x}, opcode {opcode:#04x})")]
    UnknownCommand { class: u8, opcode: u8 },
}

pub type Result<T> = std::result::Result<T, ProtoError>;
