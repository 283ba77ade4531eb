// Unit tests for the message registry
// Tests built-in catalogue, registration checks and API description

use crate::FIRST_APPLICATION_TYPE_ID;
use crate::error::registry::RegistryError;
use crate::proto::{PingRequest, SignInRequest};
use crate::registry::builtin;
use crate::registry::{MessageFlags, MessageRegistry, WoofMessage};
use crate::tests::support::{EchoRequest, EchoResponse, SecureNote, test_registry};

use prost::Message;

#[derive(Clone, PartialEq, Message)]
struct Impostor {
    #[prost(string, tag = "1")]
    text: String,
}

impl WoofMessage for Impostor {
    const TYPE_ID: u32 = 100;
    const NAME: &'static str = "Impostor";
}

#[derive(Clone, PartialEq, Message)]
struct Squatter {}

impl WoofMessage for Squatter {
    const TYPE_ID: u32 = 42;
    const NAME: &'static str = "Squatter";
}

#[derive(Clone, PartialEq, Message)]
struct FakeSignIn {}

impl WoofMessage for FakeSignIn {
    const TYPE_ID: u32 = 150;
    const NAME: &'static str = "FakeSignIn";
    const FLAGS: MessageFlags = MessageFlags::SIGN_IN;
}

/// **VALUE**: Verifies every registry starts with the built-in catalogue.
///
/// **WHY THIS MATTERS**: Ping, identify, sign-in and error replies must decode on
/// every endpoint even when the application registers nothing.
///
/// **BUG THIS CATCHES**: Would catch a builder that forgets to seed built-ins.
#[test]
fn given_builtin_registry_when_looking_up_ping_then_context_is_present() {
    let registry = MessageRegistry::builtin();

    let context = registry
        .by_id(builtin::PING_REQUEST)
        .expect("ping should be registered");

    assert_eq!(context.name, PingRequest::NAME);
    assert!(context.is_internal());
    assert!(!context.is_signed());
    assert_eq!(registry.len(), 14);
}

/// **VALUE**: Verifies the sign-in request carries both the signed and sign-in flags.
///
/// **BUG THIS CATCHES**: Would catch sign-in being verified with the (absent)
/// session key instead of the key resolved from its API key.
#[test]
fn given_sign_in_request_when_looking_up_context_then_is_signed_sign_in() {
    let registry = MessageRegistry::builtin();

    let context = registry
        .context_of::<SignInRequest>()
        .expect("sign-in should be registered");

    assert!(context.is_signed());
    assert!(context.is_sign_in());
    assert_eq!(
        context.api_key_of(&SignInRequest {
            api_key: "k-1".to_string(),
            ..Default::default()
        }),
        Some("k-1".to_string())
    );
}

/// **VALUE**: Verifies a duplicate type id is refused at registration time.
///
/// **BUG THIS CATCHES**: Would catch two shapes silently sharing one wire id,
/// which would decode one as the other.
#[test]
fn given_taken_type_id_when_registering_then_duplicate_id_error() {
    let result = MessageRegistry::builder()
        .register::<EchoRequest>()
        .and_then(|builder| builder.register::<Impostor>());

    assert!(matches!(
        result,
        Err(RegistryError::DuplicateId { type_id: 100, .. })
    ));
}

/// **VALUE**: Verifies registering the same shape twice is refused.
#[test]
fn given_registered_shape_when_registering_again_then_rejected() {
    let result = MessageRegistry::builder()
        .register::<EchoResponse>()
        .and_then(|builder| builder.register::<EchoResponse>());

    assert!(matches!(result, Err(RegistryError::DuplicateId { .. })));
}

/// **VALUE**: Verifies applications cannot claim ids in the built-in range.
#[test]
fn given_internal_type_id_when_registering_then_reserved_id_error() {
    let result = MessageRegistry::builder().register::<Squatter>();

    assert!(matches!(
        result,
        Err(RegistryError::ReservedId { type_id: 42, .. })
    ));
    assert!(42 < FIRST_APPLICATION_TYPE_ID);
}

/// **VALUE**: Verifies sign-in types must go through `register_sign_in`.
///
/// **BUG THIS CATCHES**: Would catch a sign-in type registered without an API
/// key accessor, whose signature could then never be verified.
#[test]
fn given_sign_in_flag_when_registering_plainly_then_accessor_missing_error() {
    let result = MessageRegistry::builder().register::<FakeSignIn>();

    assert!(matches!(
        result,
        Err(RegistryError::SignInAccessorMissing { .. })
    ));
}

/// **VALUE**: Verifies API description is ordered and can hide internal ids.
#[test]
fn given_application_types_when_describing_then_sorted_and_filterable() {
    let registry = test_registry();

    let all = registry.describe(false);
    let public = registry.describe(true);

    assert!(all.windows(2).all(|pair| pair[0].type_id < pair[1].type_id));
    assert_eq!(
        public.iter().map(|t| t.type_id).collect::<Vec<_>>(),
        vec![100, 101, 102, 103]
    );
    let secure = public
        .iter()
        .find(|t| t.name == SecureNote::NAME)
        .expect("secure note should be described");
    assert!(secure.is_signed);
}

/// **VALUE**: Verifies encoding an unregistered shape is an error, not a panic.
#[test]
fn given_builtin_registry_when_context_of_application_type_then_unregistered() {
    let registry = MessageRegistry::builtin();

    assert!(registry.context_of::<EchoRequest>().is_err());
}

/// **VALUE**: Verifies decoded messages stay printable through the type-erased view.
///
/// **WHY THIS MATTERS**: Unexpected replies are reported with their payload
/// rendered through `Debug`; that rendering must name the real fields.
///
/// **BUG THIS CATCHES**: Would catch a registered shape whose erased form
/// loses its `Debug` implementation.
#[test]
fn given_registered_type_when_decoding_payload_then_debug_shows_fields() {
    // GIVEN: An application type from the registry
    let registry = test_registry();
    let context = registry
        .by_id(EchoRequest::TYPE_ID)
        .expect("echo should be registered");
    let payload = EchoRequest {
        text: "visible".to_string(),
    }
    .encode_to_vec();

    // WHEN: Decoding through the context
    let decoded = context
        .decode_payload(&payload)
        .expect("payload should decode");

    // THEN: Debug output carries the field value
    let rendered = format!("{decoded:?}");
    assert!(rendered.contains("EchoRequest"), "{rendered}");
    assert!(rendered.contains("visible"), "{rendered}");
}
