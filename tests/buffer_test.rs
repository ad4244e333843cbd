use pgbackrest_core::buffer::Buffer;

#[test]
fn fresh_buffer_has_full_capacity_as_remains() {
    let buf = Buffer::new(16);
    assert_eq!(buf.size(), 16);
    assert_eq!(buf.used(), 0);
    assert_eq!(buf.remains(), 16);
}

#[test]
fn inc_used_shrinks_remains_and_grows_as_slice() {
    let mut buf = Buffer::new(8);
    buf.writable_mut()[..4].copy_from_slice(b"ABCD");
    buf.inc_used(4).unwrap();
    assert_eq!(buf.as_slice(), b"ABCD");
    assert_eq!(buf.remains(), 4);
}

#[test]
fn used_zero_resets_remains_to_full_capacity() {
    let mut buf = Buffer::new(8);
    buf.inc_used(8).unwrap();
    assert_eq!(buf.remains(), 0);
    buf.used_zero();
    assert_eq!(buf.remains(), 8);
    assert_eq!(buf.used(), 0);
}

#[test]
fn set_limit_bounds_remains_until_cleared() {
    let mut buf = Buffer::new(16);
    buf.set_limit(4).unwrap();
    assert_eq!(buf.remains(), 4);
    buf.clear_limit();
    assert_eq!(buf.remains(), 16);
}

#[test]
fn from_vec_carries_the_data_as_already_used() {
    let buf = Buffer::from_vec(b"hello".to_vec());
    assert_eq!(buf.as_slice(), b"hello");
    assert_eq!(buf.into_vec(), b"hello".to_vec());
}

#[test]
fn inc_used_past_capacity_errors() {
    let mut buf = Buffer::new(4);
    assert!(buf.inc_used(5).is_err());
}
