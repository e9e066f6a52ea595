use cindra_core::error::messages;
use cindra_core::{Any, AnyError, INLINE_CAPACITY, cast_to, cast_to_mut, cast_to_ref};
use proptest::prelude::*;
use proptest::test_runner::Config as ProptestConfig;
use std::sync::atomic::{AtomicIsize, Ordering};

static LIVE: [AtomicIsize; 8] = [const { AtomicIsize::new(0) }; 8];

/// Counts its live instances in `LIVE[TAG]`; each test uses its own tag.
#[derive(Debug, PartialEq)]
struct Tracked<const TAG: usize> {
    value: i32,
}

impl<const TAG: usize> Tracked<TAG> {
    fn new(value: i32) -> Self {
        LIVE[TAG].fetch_add(1, Ordering::SeqCst);
        Self { value }
    }

    fn live() -> isize {
        LIVE[TAG].load(Ordering::SeqCst)
    }
}

impl<const TAG: usize> Clone for Tracked<TAG> {
    fn clone(&self) -> Self {
        Self::new(self.value)
    }
}

impl<const TAG: usize> Drop for Tracked<TAG> {
    fn drop(&mut self) {
        LIVE[TAG].fetch_sub(1, Ordering::SeqCst);
    }
}

/// Tracked payload too large for the inline buffer.
#[derive(Clone, Debug, PartialEq)]
struct Heavy<const TAG: usize> {
    inner: Tracked<TAG>,
    pad: [u64; 8],
}

impl<const TAG: usize> Heavy<TAG> {
    fn new(value: i32) -> Self {
        Self {
            inner: Tracked::new(value),
            pad: [value as u64; 8],
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Fool {
    i: [f64; 128],
}

#[derive(Debug)]
struct NoClone(u32);

#[derive(Clone, Debug, PartialEq)]
#[repr(align(32))]
struct OverAligned;

#[test]
fn round_trip_preserves_value() {
    let a = Any::new(42i32).unwrap();
    assert!(!a.is_empty());
    assert_eq!(cast_to::<i32>(&a).unwrap(), 42);
    assert_eq!(a.cast::<i32>().unwrap(), 42);
    assert_eq!(*cast_to_ref::<i32>(&a).unwrap(), 42);

    let s = Any::new(String::from("hello")).unwrap();
    assert_eq!(cast_to::<String>(&s).unwrap(), "hello");
    assert_eq!(s.type_name().unwrap(), "alloc::string::String");
}

#[test]
fn default_container_is_empty() {
    let a = Any::default();
    assert!(a.is_empty());
    assert!(Any::empty().is_empty());
    assert_eq!(a.type_id(), Err(AnyError::InvalidState(messages::EMPTY_CONTAINER)));
    assert_eq!(a.is_same::<i32>(), Err(AnyError::InvalidState(messages::EMPTY_CONTAINER)));
    assert_eq!(a.is_inline(), Err(AnyError::InvalidState(messages::EMPTY_CONTAINER)));
    assert!(a.as_ptr().is_none());
    assert_eq!(format!("{a:?}"), "Any(empty)");
}

#[test]
fn casting_empty_container_fails() {
    let a = Any::empty();
    assert_eq!(
        cast_to::<i32>(&a),
        Err(AnyError::TypeMismatch {
            expected: "i32",
            found: "<empty>"
        })
    );
    assert_eq!(
        a.cast::<i32>(),
        Err(AnyError::InvalidState(messages::EMPTY_CONTAINER))
    );
}

#[test]
fn cast_to_other_type_is_a_mismatch() {
    let a = Any::new(7i32).unwrap();
    assert_eq!(
        cast_to::<u64>(&a),
        Err(AnyError::TypeMismatch {
            expected: "u64",
            found: "i32"
        })
    );
    assert!(cast_to_ref::<String>(&a).is_err());
    assert_eq!(a.is_same::<i32>(), Ok(true));
    assert_eq!(a.is_not_same::<u64>(), Ok(true));
    // The failed casts left the value alone.
    assert_eq!(cast_to::<i32>(&a).unwrap(), 7);
}

#[test]
fn same_type_queries_between_containers() {
    let a = Any::new(1i32).unwrap();
    let b = Any::new(2i32).unwrap();
    let c = Any::new(vec![1i32, 2, 3]).unwrap();
    assert_eq!(a.is_same_as(&b), Ok(true));
    assert_eq!(a.is_not_same_as(&c), Ok(true));
    assert_eq!(a.type_id().unwrap(), b.type_id().unwrap());
    assert_ne!(a.type_id().unwrap(), c.type_id().unwrap());
    assert_eq!(a.descriptor().unwrap(), b.descriptor().unwrap());
    assert_eq!(
        a.is_same_as(&Any::empty()),
        Err(AnyError::InvalidState(messages::EMPTY_OPERAND))
    );
    assert_eq!(
        Any::empty().is_same_as(&a),
        Err(AnyError::InvalidState(messages::EMPTY_CONTAINER))
    );
}

#[test]
fn reference_casts_allow_in_place_mutation() {
    let mut a = Any::new(vec![1i32, 2]).unwrap();
    cast_to_mut::<Vec<i32>>(&mut a).unwrap().push(3);
    a.downcast_mut::<Vec<i32>>().unwrap().push(4);
    assert_eq!(a.downcast_ref::<Vec<i32>>().unwrap(), &vec![1, 2, 3, 4]);
}

#[test]
fn copy_of_inline_value_is_independent() {
    type T = Tracked<0>;
    {
        let a = Any::new(T::new(7)).unwrap();
        assert_eq!(T::live(), 1);
        assert!(a.is_inline().unwrap());

        let b = a.try_clone().unwrap();
        assert_eq!(T::live(), 2);
        drop(a);
        assert_eq!(T::live(), 1);
        assert_eq!(cast_to_ref::<T>(&b).unwrap().value, 7);
    }
    assert_eq!(T::live(), 0);
}

#[test]
fn copy_of_heap_value_is_independent() {
    type T = Heavy<1>;
    {
        let mut a = Any::new(T::new(3)).unwrap();
        assert!(!a.is_inline().unwrap());
        let b = a.try_clone().unwrap();
        assert_eq!(Tracked::<1>::live(), 2);

        a.downcast_mut::<T>().unwrap().pad[0] = 99;
        assert_eq!(cast_to_ref::<T>(&b).unwrap().pad[0], 3);
        assert_ne!(a.as_ptr(), b.as_ptr());

        drop(b);
        assert_eq!(Tracked::<1>::live(), 1);
        assert_eq!(cast_to_ref::<T>(&a).unwrap().inner.value, 3);
    }
    assert_eq!(Tracked::<1>::live(), 0);
}

#[test]
fn take_moves_inline_value_and_empties_source() {
    type T = Tracked<2>;
    {
        let mut a = Any::new(T::new(11)).unwrap();
        let b = a.take();
        assert!(a.is_empty());
        assert_eq!(T::live(), 1);
        assert_eq!(cast_to::<T>(&b).unwrap(), T::new(11));
        // Taking from an empty container yields another empty one.
        assert!(a.take().is_empty());
    }
    assert_eq!(T::live(), 0);
}

#[test]
fn take_transfers_heap_ownership() {
    type T = Heavy<3>;
    {
        let mut a = Any::new(T::new(5)).unwrap();
        let before = a.as_ptr();
        let b = a.take();
        assert!(a.is_empty());
        assert_eq!(b.as_ptr(), before);
        assert_eq!(Tracked::<3>::live(), 1);

        // A plain Rust move keeps the payload valid as well.
        let c = b;
        assert_eq!(cast_to_ref::<T>(&c).unwrap().inner.value, 5);
    }
    assert_eq!(Tracked::<3>::live(), 0);
}

#[test]
fn move_assignment_leaves_source_empty() {
    type T = Tracked<4>;
    {
        let mut a = Any::new(T::new(1)).unwrap();
        let mut b = Any::new(T::new(2)).unwrap();
        a.assign_move(&mut b).unwrap();
        assert!(b.is_empty());
        assert_eq!(T::live(), 1);
        assert_eq!(cast_to_ref::<T>(&a).unwrap().value, 2);

        let mut s = Any::new(String::from("other")).unwrap();
        a.assign_move(&mut s).unwrap();
        assert_eq!(T::live(), 0);
        assert!(s.is_empty());
        assert_eq!(cast_to::<String>(&a).unwrap(), "other");

        let mut empty = Any::empty();
        a.assign_move(&mut empty).unwrap();
        assert!(a.is_empty());
    }
    assert_eq!(T::live(), 0);
}

#[test]
fn copy_assignment_in_place_and_across_types() {
    type T = Tracked<5>;
    {
        let mut a = Any::new(T::new(1)).unwrap();
        let b = Any::new(T::new(2)).unwrap();
        a.assign(&b).unwrap();
        assert_eq!(T::live(), 2);
        assert_eq!(cast_to_ref::<T>(&a).unwrap().value, 2);
        assert_eq!(cast_to_ref::<T>(&b).unwrap().value, 2);

        let text = Any::new(String::from("copied")).unwrap();
        a.assign(&text).unwrap();
        assert_eq!(T::live(), 1);
        assert_eq!(cast_to::<String>(&a).unwrap(), "copied");
        assert_eq!(cast_to::<String>(&text).unwrap(), "copied");

        assert_eq!(
            a.assign(&Any::empty()),
            Err(AnyError::InvalidState(messages::EMPTY_OPERAND))
        );
        assert_eq!(cast_to::<String>(&a).unwrap(), "copied");
    }
    assert_eq!(T::live(), 0);
}

#[test]
fn into_inner_moves_value_out() {
    type T = Tracked<6>;
    {
        let a = Any::new(T::new(9)).unwrap();
        let a = a.into_inner::<String>().unwrap_err();
        assert_eq!(T::live(), 1);
        let value = a.into_inner::<T>().unwrap();
        assert_eq!(value.value, 9);
        assert_eq!(T::live(), 1);
    }
    assert_eq!(T::live(), 0);

    let big = Any::new(vec![7u8; 64]).unwrap();
    assert_eq!(big.into_inner::<Vec<u8>>().unwrap().len(), 64);
}

#[test]
fn reset_and_replace() {
    type T = Tracked<7>;
    let mut a = Any::new(T::new(1)).unwrap();
    a.reset();
    assert!(a.is_empty());
    assert_eq!(T::live(), 0);
    a.reset();

    a.replace(T::new(2)).unwrap();
    assert_eq!(T::live(), 1);
    a.replace(3.5f64).unwrap();
    assert_eq!(T::live(), 0);
    assert_eq!(cast_to::<f64>(&a).unwrap(), 3.5);
}

#[test]
fn oversized_value_lives_on_the_heap_without_clobbering_neighbours() {
    #[repr(C)]
    struct Fenced {
        before: u64,
        any: Any,
        after: u64,
    }

    let mut fool = Fool { i: [0.0; 128] };
    for (n, slot) in fool.i.iter_mut().enumerate() {
        *slot = n as f64 * 0.5;
    }
    let fenced = Fenced {
        before: 0xDEAD_BEEF,
        any: Any::new(fool.clone()).unwrap(),
        after: 0xFEED_FACE,
    };
    let dispatch = fenced.any.dispatch().unwrap();
    assert!(!dispatch.fits_inline());
    assert_eq!(dispatch.size(), std::mem::size_of::<Fool>());
    assert!(!fenced.any.is_inline().unwrap());
    assert_eq!(fenced.before, 0xDEAD_BEEF);
    assert_eq!(fenced.after, 0xFEED_FACE);
    assert_eq!(cast_to::<Fool>(&fenced.any).unwrap(), fool);

    let copy = fenced.any.try_clone().unwrap();
    assert_eq!(cast_to_ref::<Fool>(&copy).unwrap(), &fool);
}

#[test]
fn residency_follows_size_and_alignment() {
    assert!(Any::new(0u64).unwrap().is_inline().unwrap());
    assert!(Any::new(()).unwrap().is_inline().unwrap());
    assert!(!Any::new([0u8; INLINE_CAPACITY + 1]).unwrap().is_inline().unwrap());

    let aligned = Any::new(OverAligned).unwrap();
    assert!(!aligned.is_inline().unwrap());
    let ptr = aligned.as_ptr().unwrap() as usize;
    assert_eq!(ptr % 32, 0);
    assert_eq!(cast_to::<OverAligned>(&aligned).unwrap(), OverAligned);
}

#[test]
fn non_copyable_values_refuse_to_copy() {
    let a = Any::new_unique(NoClone(4)).unwrap();
    assert_eq!(
        a.try_clone().unwrap_err(),
        AnyError::NotCopyable(std::any::type_name::<NoClone>())
    );
    assert_eq!(a.downcast_ref::<NoClone>().unwrap().0, 4);

    let mut b = Any::new_unique(NoClone(5)).unwrap();
    assert_eq!(
        b.assign(&a),
        Err(AnyError::NotCopyable(std::any::type_name::<NoClone>()))
    );
    let mut moved = Any::empty();
    moved.assign_move(&mut b).unwrap();
    assert_eq!(moved.into_inner::<NoClone>().unwrap().0, 5);
}

#[test]
fn copyability_follows_the_type_not_the_constructor() {
    let cloned = Any::new(6u32).unwrap();
    let mut unique = Any::new_unique(5u32).unwrap();
    assert!(unique.is_same_as(&cloned).unwrap());
    assert_eq!(cast_to::<u32>(&unique.try_clone().unwrap()).unwrap(), 5);

    unique.assign(&cloned).unwrap();
    assert_eq!(cast_to::<u32>(&unique).unwrap(), 6);
    let mut target = Any::new(7u32).unwrap();
    target.assign(&Any::new_unique(8u32).unwrap()).unwrap();
    assert_eq!(cast_to::<u32>(&target).unwrap(), 8);
}

#[derive(Clone, Debug, PartialEq)]
struct Badge(u8);

#[test]
fn unique_boxes_copy_once_the_clone_is_known() {
    let unique = Any::new_unique(Badge(1)).unwrap();
    assert_eq!(
        unique.try_clone().unwrap_err(),
        AnyError::NotCopyable(std::any::type_name::<Badge>())
    );
    let other = Any::new(Badge(2)).unwrap();
    let copy = unique.try_clone().unwrap();
    assert_eq!(cast_to::<Badge>(&copy).unwrap(), Badge(1));
    assert!(copy.dispatch().is_some());
    assert_eq!(cast_to::<Badge>(&other).unwrap(), Badge(2));
}

#[test]
fn copying_an_empty_container_is_invalid() {
    assert_eq!(
        Any::empty().try_clone().unwrap_err(),
        AnyError::InvalidState(messages::EMPTY_CONTAINER)
    );
}

#[test]
fn in_place_and_by_reference_construction() {
    let a = Any::new_with(|| vec![true; 3]).unwrap();
    assert_eq!(cast_to::<Vec<bool>>(&a).unwrap(), vec![true; 3]);

    let original = String::from("borrowed");
    let b = Any::from_ref(&original).unwrap();
    assert_eq!(cast_to_ref::<String>(&b).unwrap(), &original);
    assert_eq!(format!("{b:?}"), "Any(alloc::string::String)");
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64, .. ProptestConfig::default()
    })]
    #[test]
    fn integers_round_trip(v in any::<i64>()) {
        let a = Any::new(v).unwrap();
        prop_assert_eq!(cast_to::<i64>(&a).unwrap(), v);
        let b = a.try_clone().unwrap();
        prop_assert_eq!(cast_to::<i64>(&b).unwrap(), v);
    }

    #[test]
    fn strings_round_trip_through_copy_and_take(
        s in proptest::collection::vec(any::<char>(), 0..40).prop_map(String::from_iter)
    ) {
        let mut a = Any::new(s.clone()).unwrap();
        let b = a.try_clone().unwrap();
        let c = a.take();
        prop_assert!(a.is_empty());
        prop_assert_eq!(cast_to::<String>(&b).unwrap(), s.clone());
        prop_assert_eq!(cast_to::<String>(&c).unwrap(), s);
    }
}
