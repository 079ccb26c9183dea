//! Property tests for the peer envelope cipher.

use pc_crypto::{decrypt, encrypt, CryptoError, Envelope, IdentityProvider, MessageContent};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn text_roundtrip(text in ".{0,512}") {
        let alice = IdentityProvider::new();
        let bob = IdentityProvider::new();
        let msg = MessageContent::Text(text);

        let wire = encrypt(&alice, &msg, &bob.ensure_identity()).unwrap().to_bytes();
        let env = Envelope::from_bytes(&wire).unwrap();
        let out = decrypt(&bob, &env, &alice.ensure_identity()).unwrap();
        prop_assert_eq!(out, msg);
    }

    #[test]
    fn image_roundtrip(bytes in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let alice = IdentityProvider::new();
        let bob = IdentityProvider::new();
        let msg = MessageContent::Image(bytes);

        let env = encrypt(&alice, &msg, &bob.ensure_identity()).unwrap();
        prop_assert_eq!(decrypt(&bob, &env, &alice.ensure_identity()).unwrap(), msg);
    }

    #[test]
    fn encrypting_twice_gives_fresh_nonce_and_ciphertext(text in ".{0,128}") {
        let alice = IdentityProvider::new();
        let bob = IdentityProvider::new().ensure_identity();
        let msg = MessageContent::Text(text);

        let a = encrypt(&alice, &msg, &bob).unwrap();
        let b = encrypt(&alice, &msg, &bob).unwrap();
        prop_assert_ne!(a.nonce, b.nonce);
        prop_assert_ne!(a.to_bytes(), b.to_bytes());
    }

    #[test]
    fn any_flipped_byte_is_rejected(text in ".{1,64}", pos in any::<prop::sample::Index>(), bit in 0u8..8) {
        let alice = IdentityProvider::new();
        let bob = IdentityProvider::new();
        let msg = MessageContent::Text(text);

        let mut env = encrypt(&alice, &msg, &bob.ensure_identity()).unwrap();
        let i = pos.index(env.ciphertext.len());
        env.ciphertext[i] ^= 1 << bit;
        let result = decrypt(&bob, &env, &alice.ensure_identity());
        prop_assert!(matches!(result, Err(CryptoError::Authentication)));
    }
}
