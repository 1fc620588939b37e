use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("socket bind failed on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("multicast join failed: {0}")]
    Multicast(std::io::Error),

    #[error("send failed: {0}")]
    Send(#[from] std::io::Error),
}
