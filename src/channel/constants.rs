//! Channel Content Types

// Xgress session data carried over a link
pub const CONTENT_TYPE_PAYLOAD: i32 = 1100;
pub const CONTENT_TYPE_ACKNOWLEDGEMENT: i32 = 1101;
pub const CONTENT_TYPE_CONTROL: i32 = 1102;
