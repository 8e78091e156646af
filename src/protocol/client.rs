//! Blocking client for the command protocol.
//!
//! Every command is answered by an optional response frame followed by an
//! acknowledge frame carrying the command code.

use std::{
    io::{BufReader, BufWriter},
    net::{TcpStream, ToSocketAddrs},
};

use crate::error::PacketError;
use crate::protocol::packet::{Frame, unpack_stream, write_frame};

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub response: Option<Frame>,
    pub ack: char,
}

pub struct Client {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl Client {
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, PacketError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            reader: BufReader::new(stream.try_clone()?),
            writer: BufWriter::new(stream),
        })
    }

    pub fn send(&mut self, frame: &Frame) -> Result<(), PacketError> {
        write_frame(&mut self.writer, frame)
    }

    pub fn recv(&mut self) -> Result<Frame, PacketError> {
        unpack_stream(&mut self.reader)
    }

    /// Read frames until the acknowledge; at most one response may precede it.
    pub fn read_reply(&mut self) -> Result<Reply, PacketError> {
        let mut response = None;
        loop {
            match self.recv()? {
                Frame::Acknowledge(ack) => return Ok(Reply { response, ack }),
                other if response.is_none() => response = Some(other),
                other => return Err(PacketError::UnexpectedFrame(other.tag().as_char())),
            }
        }
    }

    /// Send a command code with an optional argument frame and wait for the reply.
    pub fn command(&mut self, code: char, argument: Option<Frame>) -> Result<Reply, PacketError> {
        self.send(&Frame::Command(code))?;
        if let Some(arg) = argument {
            self.send(&arg)?;
        }
        self.read_reply()
    }

    /// Fetch the controller log (`r`) as rows of seven columns.
    pub fn read_log(&mut self) -> Result<Vec<Vec<f64>>, PacketError> {
        match self.command('r', None)?.response {
            Some(Frame::Matrix { cols, data, .. }) if cols > 0 => {
                Ok(data.chunks(cols).map(<[f64]>::to_vec).collect())
            }
            Some(Frame::Matrix { .. }) => Ok(Vec::new()),
            Some(other) => Err(PacketError::UnexpectedFrame(other.tag().as_char())),
            None => Ok(Vec::new()),
        }
    }
}
