pub mod crypto_constants;
pub mod key_stream;
pub mod version;

pub use crypto_constants::*;
pub use key_stream::*;
pub use version::*;
