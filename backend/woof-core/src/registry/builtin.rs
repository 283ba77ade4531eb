//! Type ids and flags of the built-in administrative catalogue.

use crate::proto::{
    ApiQueryRequest, ApiQueryResponse, AuthErrorResponse, ErrorResponse, IdentifyRequest,
    IdentifyResponse, PingRequest, PingResponse, SignInRequest, SignInResponse, SignOutRequest,
    SignOutResponse, StreamFragmentRequest, StreamFragmentResponse,
};
use crate::registry::{MessageFlags, SignInMessage, TypeContext, WoofMessage};

pub const ERROR_RESPONSE: u32 = 1;
pub const AUTH_ERROR_RESPONSE: u32 = 2;
pub const PING_REQUEST: u32 = 3;
pub const PING_RESPONSE: u32 = 4;
pub const IDENTIFY_REQUEST: u32 = 5;
pub const IDENTIFY_RESPONSE: u32 = 6;
pub const API_QUERY_REQUEST: u32 = 7;
pub const API_QUERY_RESPONSE: u32 = 8;
pub const SIGN_IN_REQUEST: u32 = 9;
pub const SIGN_IN_RESPONSE: u32 = 10;
pub const SIGN_OUT_REQUEST: u32 = 11;
pub const SIGN_OUT_RESPONSE: u32 = 12;
pub const STREAM_FRAGMENT_REQUEST: u32 = 13;
pub const STREAM_FRAGMENT_RESPONSE: u32 = 14;

macro_rules! woof_message {
    ($shape:ty, $id:expr, $flags:expr) => {
        impl WoofMessage for $shape {
            const TYPE_ID: u32 = $id;
            const NAME: &'static str = stringify!($shape);
            const FLAGS: MessageFlags = $flags;
        }
    };
}

woof_message!(ErrorResponse, ERROR_RESPONSE, MessageFlags::ERROR);
woof_message!(AuthErrorResponse, AUTH_ERROR_RESPONSE, MessageFlags::ERROR);
woof_message!(PingRequest, PING_REQUEST, MessageFlags::NONE);
woof_message!(PingResponse, PING_RESPONSE, MessageFlags::NONE);
woof_message!(IdentifyRequest, IDENTIFY_REQUEST, MessageFlags::NONE);
woof_message!(IdentifyResponse, IDENTIFY_RESPONSE, MessageFlags::NONE);
woof_message!(ApiQueryRequest, API_QUERY_REQUEST, MessageFlags::NONE);
woof_message!(ApiQueryResponse, API_QUERY_RESPONSE, MessageFlags::NONE);
woof_message!(SignInRequest, SIGN_IN_REQUEST, MessageFlags::SIGN_IN);
// Signed with the freshly bound session key, so the client learns the
// server holds the same secret.
woof_message!(SignInResponse, SIGN_IN_RESPONSE, MessageFlags::SIGNED);
woof_message!(SignOutRequest, SIGN_OUT_REQUEST, MessageFlags::SIGNED);
woof_message!(SignOutResponse, SIGN_OUT_RESPONSE, MessageFlags::NONE);
woof_message!(StreamFragmentRequest, STREAM_FRAGMENT_REQUEST, MessageFlags::NONE);
woof_message!(StreamFragmentResponse, STREAM_FRAGMENT_RESPONSE, MessageFlags::NONE);

impl SignInMessage for SignInRequest {
    fn api_key(&self) -> &str {
        &self.api_key
    }
}

pub(crate) fn contexts() -> Vec<TypeContext> {
    vec![
        TypeContext::of::<ErrorResponse>(),
        TypeContext::of::<AuthErrorResponse>(),
        TypeContext::of::<PingRequest>(),
        TypeContext::of::<PingResponse>(),
        TypeContext::of::<IdentifyRequest>(),
        TypeContext::of::<IdentifyResponse>(),
        TypeContext::of::<ApiQueryRequest>(),
        TypeContext::of::<ApiQueryResponse>(),
        TypeContext::of_sign_in::<SignInRequest>(),
        TypeContext::of::<SignInResponse>(),
        TypeContext::of::<SignOutRequest>(),
        TypeContext::of::<SignOutResponse>(),
        TypeContext::of::<StreamFragmentRequest>(),
        TypeContext::of::<StreamFragmentResponse>(),
    ]
}
