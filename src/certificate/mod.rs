//! Trust handling for devices that ship self-signed or otherwise non-compliant certificates.
//!
//! Instead of public CA validation, the leaf certificate a device presents during setup is stored
//! with its registration and every later connection is accepted only if the device presents that
//! exact certificate again. Hostnames and chains are never checked, so a device keeps working
//! after its address changes.

mod client;
mod fetch;
mod pem;
mod verifier;

pub use client::build_pinned_client;
pub use fetch::fetch_leaf_certificate;
pub use pem::{decode_pem, encode_pem};

use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CertificateError {
    #[error("'{0}' has no host to connect to")]
    InvalidUrl(String),
    #[error("connection failed: {0}")]
    Io(#[from] io::Error),
    #[error("no handshake within {0:?}")]
    Timeout(Duration),
    #[error("invalid server name: {0}")]
    ServerName(#[from] rustls::pki_types::InvalidDnsNameError),
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),
    #[error("the device did not present a certificate")]
    NoPeerCertificate,
    #[error("the pinned certificate is not a valid PEM certificate")]
    InvalidPem,
    #[error("could not build the HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
