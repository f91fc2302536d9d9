use proptest::prelude::*;
use synctree::{DecodeContext, DirtySet, PackOptions, Record, UnpackOptions};
use synctree_derive::Record as DeriveRecord;

#[derive(Debug, Clone, Default, PartialEq, DeriveRecord)]
struct Point {
	_dirty: DirtySet,
	#[field(index = 1)]
	_x: i32,
	#[field(index = 2)]
	_y: i32,
}

#[derive(Debug, Clone, Default, PartialEq, DeriveRecord)]
struct Rect {
	_dirty: DirtySet,
	#[field(index = 1)]
	_lt: Point,
	#[field(index = 2)]
	_rb: Point,
}

proptest! {
	// Round-trip law (§8): decode(encode(r, "dict")) == r structurally.
	#[test]
	fn dict_round_trip_preserves_value(x in any::<i32>(), y in any::<i32>(), lx in any::<i32>(), ly in any::<i32>()) {
		let mut r = Rect::default();
		r.lt_mut().set_x(x);
		r.lt_mut().set_y(y);
		r.rb_mut().set_x(lx);
		r.rb_mut().set_y(ly);

		let dict = r.pack_dict(&PackOptions::new());
		let mut decoded = Rect::default();
		let mut ctx = DecodeContext::new();
		decoded.unpack_dict(&dict, &UnpackOptions::new(), &mut ctx).unwrap();

		// Structural equality only: `lt_mut()`/`rb_mut()` leave dirty bits on
		// `r`'s sub-records that a freshly-decoded value never carries.
		r.clear_changed(&[], true);
		prop_assert_eq!(r, decoded);
	}

	// Round-trip law (§8): decode(encode(r, "bin")) == r structurally.
	#[test]
	fn bin_round_trip_preserves_value(x in any::<i32>(), y in any::<i32>(), lx in any::<i32>(), ly in any::<i32>()) {
		let mut r = Rect::default();
		r.lt_mut().set_x(x);
		r.lt_mut().set_y(y);
		r.rb_mut().set_x(lx);
		r.rb_mut().set_y(ly);

		let mut buf = Vec::new();
		r.pack_bin(&PackOptions::new(), &mut buf).unwrap();
		let mut decoded = Rect::default();
		let mut cur = std::io::Cursor::new(buf.as_slice());
		let mut ctx = DecodeContext::new();
		decoded.unpack_bin(&mut cur, &UnpackOptions::new(), &mut ctx).unwrap();
		r.clear_changed(&[], true);
		prop_assert_eq!(r, decoded);
	}

	// Delta correctness (§8): applying an only_changed delta in sync mode to
	// a clone of the pre-mutation value reproduces the post-mutation value.
	#[test]
	fn delta_sync_replays_mutation(initial_x in any::<i32>(), new_x in any::<i32>(), new_y in any::<i32>()) {
		let mut r = Point::default();
		r.set_x(initial_x);
		let mut r0 = r.clone();
		r0.clear_changed(&[], true);
		r.clear_changed(&[], true);

		r.set_x(new_x);
		r.set_y(new_y);

		let delta = r.pack_dict(&PackOptions::new().only_changed());
		let mut ctx = DecodeContext::new();
		r0.unpack_dict(&delta, &UnpackOptions::new().sync(), &mut ctx).unwrap();
		r.clear_changed(&[], true);
		prop_assert_eq!(r0, r);
	}
}
