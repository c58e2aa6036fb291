//! HTTP/1.1 protocol types: request parsing, response construction, wire
//! encoding, and the CGI response/meta-variable pieces that sit next to
//! them.

mod cgi_meta;
mod cgi_response;
mod content_type;
mod encoder;
mod headers;
mod method;
mod request;
mod response;
mod status;

pub use cgi_meta::CgiMetaVariables;
pub use cgi_response::{CgiResponse, CgiResponseType};
pub use content_type::content_type_for_path;
pub use encoder::{BodyMode, EncoderOptions, ResponseEncoder};
pub use headers::HeaderMap;
pub use method::Method;
pub use request::{
    BodySink, DiscardSink, HttpRequest, ParseLimits, ParsePhase, VecSink,
};
pub use response::{HttpResponse, ResponsePhase};
pub use status::HttpStatus;
