//! Provider implementations

pub mod spotify_client;

pub use spotify_client::SpotifyClient;
