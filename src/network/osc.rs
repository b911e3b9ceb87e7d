//! OSC forwarding of channel values
//!
//! Each channel is sent as its own OSC message:
//!
//! ```text
//! "/VRSL/ch<index>\0" (padded to 4) | ",i\0\0" | value (i32, big-endian)
//! ```

use rosc::{OscMessage, OscPacket, OscType};
use std::net::{SocketAddr, UdpSocket};

use crate::config::OscConfig;
use crate::error::{Error, NetworkError};
use crate::render::{Frame, FrameSink};

/// Encode a single-integer OSC message
pub fn encode_message(address: &str, value: i32) -> Result<Vec<u8>, NetworkError> {
    let packet = OscPacket::Message(OscMessage {
        addr: address.to_string(),
        args: vec![OscType::Int(value)],
    });
    rosc::encoder::encode(&packet).map_err(|e| NetworkError::OscEncode(format!("{:?}", e)))
}

/// Sends channel values as OSC messages over UDP
pub struct OscSender {
    socket: UdpSocket,
    target: SocketAddr,
    prefix: String,
    /// Values sent for the previous frame
    last: Vec<u8>,
    primed: bool,
    messages_sent: u64,
}

impl OscSender {
    pub fn new(config: &OscConfig) -> Result<Self, Error> {
        let target = config.target_addr()?;
        let socket = UdpSocket::bind("0.0.0.0:0").map_err(NetworkError::SocketCreate)?;

        tracing::info!("OSC forwarding to {} with prefix {}", target, config.address_prefix);

        Ok(Self {
            socket,
            target,
            prefix: config.address_prefix.clone(),
            last: Vec::new(),
            primed: false,
            messages_sent: 0,
        })
    }

    /// Send one channel value
    pub fn send_channel(&mut self, channel: usize, value: u8) -> Result<(), NetworkError> {
        let message = encode_message(&format!("{}{}", self.prefix, channel), value as i32)?;
        self.socket
            .send_to(&message, self.target)
            .map_err(NetworkError::SendFailed)?;
        self.messages_sent += 1;
        Ok(())
    }

    /// Send every channel that changed since the previous call; everything on
    /// the first call. Returns the number of messages sent.
    pub fn forward(&mut self, channels: &[u8]) -> Result<usize, NetworkError> {
        if self.last.len() != channels.len() {
            self.last = vec![0; channels.len()];
            self.primed = false;
        }

        let mut sent = 0;
        for (index, &value) in channels.iter().enumerate() {
            if self.primed && self.last[index] == value {
                continue;
            }
            self.send_channel(index, value)?;
            self.last[index] = value;
            sent += 1;
        }
        self.primed = true;

        Ok(sent)
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl FrameSink for OscSender {
    fn name(&self) -> &str {
        "osc"
    }

    fn present(&mut self, frame: &Frame) -> crate::Result<()> {
        self.forward(&frame.raw)?;
        Ok(())
    }
}
