// outbound request did not complete, e.g. connect failure, timeout or interrupted body
pub const HTTP_TRANSPORT: &str = "HTTP_TRANSPORT";
