//! Profile model and `.ovpn` parser.

mod configuration;
mod directive;
mod parser;

pub use configuration::{
    CompressionAlgorithm, CompressionFraming, Configuration, DEFAULT_PORT, Endpoint, Ipv4Interface,
    Ipv6Interface, ProxySettings, Route4, Route6, RoutingPolicy, SocketType, TlsWrap,
    TlsWrapStrategy, Topology,
};
pub use parser::{ConfigurationParser, ParseResult, ParserWarning, parse_push_reply};
