mod info_response;

pub use info_response::InfoResponse;
