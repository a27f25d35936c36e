// sipflow - SIP transport and transaction engine
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Status code tokens and their canonical reason phrases.

// 1xx
pub const TRYING: &str = "100";
pub const DIALOG_ESTABLISHMENT: &str = "101";
pub const RINGING: &str = "180";
pub const CALL_IS_BEING_FORWARDED: &str = "181";
pub const QUEUED: &str = "182";
pub const SESSION_PROGRESS: &str = "183";
// 2xx
pub const OK: &str = "200";
// 3xx
pub const MULTIPLE_CHOICES: &str = "300";
pub const MOVED_PERMANENTLY: &str = "301";
pub const MOVED_TEMPORARILY: &str = "302";
pub const USE_PROXY: &str = "305";
pub const ALTERNATIVE_SERVICE: &str = "380";
// 4xx
pub const BAD_REQUEST: &str = "400";
pub const UNAUTHORIZED: &str = "401";
pub const PAYMENT_REQUIRED: &str = "402";
pub const FORBIDDEN: &str = "403";
pub const NOT_FOUND: &str = "404";
pub const METHOD_NOT_ALLOWED: &str = "405";
pub const NOT_ACCEPTABLE: &str = "406";
pub const PROXY_AUTHENTICATION_REQUIRED: &str = "407";
pub const REQUEST_TIMEOUT: &str = "408";
pub const CONFLICT: &str = "409";
pub const GONE: &str = "410";
pub const LENGTH_REQUIRED: &str = "411";
pub const REQUEST_ENTITY_TOO_LARGE: &str = "413";
pub const REQUEST_URI_TOO_LONG: &str = "414";
pub const UNSUPPORTED_MEDIA_TYPE: &str = "415";
pub const UNSUPPORTED_URI_SCHEME: &str = "416";
pub const BAD_EXTENSION: &str = "420";
pub const EXTENSION_REQUIRED: &str = "421";
pub const INTERVAL_TOO_BRIEF: &str = "423";
pub const TEMPORARILY_UNAVAILABLE: &str = "480";
pub const CALL_OR_TRANSACTION_DOES_NOT_EXIST: &str = "481";
pub const LOOP_DETECTED: &str = "482";
pub const TOO_MANY_HOPS: &str = "483";
pub const ADDRESS_INCOMPLETE: &str = "484";
pub const AMBIGUOUS: &str = "485";
pub const BUSY_HERE: &str = "486";
pub const REQUEST_TERMINATED: &str = "487";
pub const NOT_ACCEPTABLE_HERE: &str = "488";
pub const REQUEST_PENDING: &str = "489";
pub const UNDECIPHERABLE: &str = "490";
// 5xx
pub const SERVER_INTERNAL_ERROR: &str = "500";
pub const NOT_IMPLEMENTED: &str = "501";
pub const BAD_GATEWAY: &str = "502";
pub const SERVICE_UNAVAILABLE: &str = "503";
pub const SERVER_TIMEOUT: &str = "504";
pub const VERSION_NOT_SUPPORTED: &str = "505";
pub const MESSAGE_TOO_LARGE: &str = "513";
// 6xx
pub const BUSY_EVERYWHERE: &str = "600";
pub const DECLINE: &str = "603";
pub const DOES_NOT_EXIST_ANYWHERE: &str = "604";

/// Returns the canonical reason phrase for a status code token.
pub fn phrase(code: &str) -> &'static str {
    match code {
        TRYING => "Trying",
        DIALOG_ESTABLISHMENT => "Dialog Establishment",
        RINGING => "Ringing",
        CALL_IS_BEING_FORWARDED => "Call Is Being Forwarded",
        QUEUED => "Queued",
        SESSION_PROGRESS => "Session Progress",
        OK => "OK",
        MULTIPLE_CHOICES => "Multiple Choices",
        MOVED_PERMANENTLY => "Moved Permanently",
        MOVED_TEMPORARILY => "Moved Temporarily",
        USE_PROXY => "Use Proxy",
        ALTERNATIVE_SERVICE => "Alternative Service",
        BAD_REQUEST => "Bad Request",
        UNAUTHORIZED => "Unauthorized",
        PAYMENT_REQUIRED => "Payment Required",
        FORBIDDEN => "Forbidden",
        NOT_FOUND => "Not Found",
        METHOD_NOT_ALLOWED => "Method Not Allowed",
        NOT_ACCEPTABLE => "Not Acceptable",
        PROXY_AUTHENTICATION_REQUIRED => "Proxy Authentication Required",
        REQUEST_TIMEOUT => "Request Timeout",
        CONFLICT => "Conflict",
        GONE => "Gone",
        LENGTH_REQUIRED => "Length Required",
        REQUEST_ENTITY_TOO_LARGE => "Request Entity Too Large",
        REQUEST_URI_TOO_LONG => "Request-URI Too Long",
        UNSUPPORTED_MEDIA_TYPE => "Unsupported Media Type",
        UNSUPPORTED_URI_SCHEME => "Unsupported URI Scheme",
        BAD_EXTENSION => "Bad Extension",
        EXTENSION_REQUIRED => "Extension Required",
        INTERVAL_TOO_BRIEF => "Interval Too Brief",
        TEMPORARILY_UNAVAILABLE => "Temporarily Unavailable",
        CALL_OR_TRANSACTION_DOES_NOT_EXIST => "Call/Transaction Does Not Exist",
        LOOP_DETECTED => "Loop Detected",
        TOO_MANY_HOPS => "Too Many Hops",
        ADDRESS_INCOMPLETE => "Address Incomplete",
        AMBIGUOUS => "Ambiguous",
        BUSY_HERE => "Busy Here",
        REQUEST_TERMINATED => "Request Terminated",
        NOT_ACCEPTABLE_HERE => "Not Acceptable Here",
        REQUEST_PENDING => "Request Pending",
        UNDECIPHERABLE => "Undecipherable",
        SERVER_INTERNAL_ERROR => "Server Internal Error",
        NOT_IMPLEMENTED => "Not Implemented",
        BAD_GATEWAY => "Bad Gateway",
        SERVICE_UNAVAILABLE => "Service Unavailable",
        SERVER_TIMEOUT => "Server Timeout",
        VERSION_NOT_SUPPORTED => "Version Not Supported",
        MESSAGE_TOO_LARGE => "Message Too Large",
        BUSY_EVERYWHERE => "Busy Everywhere",
        DECLINE => "Decline",
        DOES_NOT_EXIST_ANYWHERE => "Does Not Exist Anywhere",
        _ => "Unknown Status Code",
    }
}

/// Returns the numeric value of a known status code token, or 0.
pub fn code(status: &str) -> u16 {
    if phrase(status) == "Unknown Status Code" {
        return 0;
    }
    status.parse().unwrap_or(0)
}
