//! Client APIs for the data broker
//!
//! [`DataSource`] pushes packets into a dataset, [`DataSink`] pops them
//! back out, and [`fetch_datasets`] queries the broker's live dataset
//! names. The broker treats payloads as opaque bytes; serialization is the
//! caller's concern.

pub mod sink;
pub mod source;

pub use sink::DataSink;
pub use source::DataSource;

use tokio::net::{TcpStream, ToSocketAddrs};

use crate::error::{Error, Result};
use crate::protocol::constants::DEFAULT_MAX_FRAME_LEN;
use crate::protocol::frame::{read_frame, write_frame};
use crate::protocol::handshake::{Handshake, InfoResponse, Role};

/// Ask a broker for the names of its live datasets
pub async fn fetch_datasets<A: ToSocketAddrs>(addr: A) -> Result<Vec<String>> {
    let mut stream = TcpStream::connect(addr).await?;

    let handshake = Handshake::new(Role::Info, "").encode()?;
    write_frame(&mut stream, &handshake).await?;

    let payload = read_frame(&mut stream, DEFAULT_MAX_FRAME_LEN)
        .await?
        .ok_or(Error::ConnectionClosed)?;
    let response = InfoResponse::decode(&payload)?;

    Ok(response.datasets)
}
