use tokio::net::TcpStream;
use tracing::trace;

use crate::network::enode::Target;

/// Open the TCP stream a probe runs over.
pub async fn connect(target: &Target) -> tokio::io::Result<TcpStream> {
    let stream = TcpStream::connect((target.host.as_str(), target.port)).await?;
    stream.set_nodelay(true)?;
    trace!(addr = %target.addr(), "tcp connected");
    Ok(stream)
}
