//! The tagged-pointer secret must be set before any tagged pointer exists,
//! so this binary holds a single test.

use oxiobj::Error;
use oxiobj::runtime::{TaggedPointer, set_tagged_pointer_secret};

#[test]
fn test_secret_scrambles_words_but_not_values() {
    let secret = 0x5a5a_5a50usize;
    set_tagged_pointer_secret(secret).unwrap();

    let tagged = TaggedPointer::new(2, 0x1234).unwrap();
    let plain = (0x1234 << 4) | (2 << 1) | 1;
    assert_eq!(tagged.word(), plain ^ secret);
    assert_eq!(tagged.word() & 1, 1);
    assert_eq!(tagged.index(), 2);
    assert_eq!(tagged.value(), 0x1234);

    assert_eq!(
        set_tagged_pointer_secret(0),
        Err(Error::TaggedPointerSecretLocked)
    );
}
