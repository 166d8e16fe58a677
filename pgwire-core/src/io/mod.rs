mod buffered;
mod codec;
mod framed;

pub use buffered::BufferedSocket;
pub use codec::Codec;
pub use framed::Framed;
