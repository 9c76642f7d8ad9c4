use std::sync::Arc;

use pretty_assertions::assert_eq;
use proptest::prelude::*;

use super::*;
use crate::{EntryMeta, hash_bytes};

struct Opaque(u8);
crate::impl_cache_opaque!(Opaque);

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct Energy {
	total: f64,
	label: String,
}
crate::impl_cache_serde!(Energy);

#[test]
fn set_then_get_returns_same_value() {
	let cache = CacheMap::new();
	cache.set("e", 1.5_f64, CachePolicy::NONE).unwrap();
	assert_eq!(cache.get::<f64>("e", false).unwrap().as_deref(), Some(&1.5));
	assert_eq!(cache.size(), 1);
	assert_eq!(cache.count("e"), 1);
	assert_eq!(cache.count("missing"), 0);
}

#[test]
fn wrong_type_yields_none() {
	let cache = CacheMap::new();
	cache.set("e", 3_i64, CachePolicy::NONE).unwrap();
	assert!(cache.get::<String>("e", false).unwrap().is_none());
	assert!(cache.get::<i64>("missing", true).unwrap().is_none());
}

#[test]
fn set_overwrites_previous_entry() {
	let cache = CacheMap::new();
	cache.set("k", "a".to_string(), CachePolicy::NONE).unwrap();
	cache.set("k", 7_u32, CachePolicy::CHECKPOINT_LOCAL).unwrap();
	assert_eq!(cache.size(), 1);
	assert_eq!(cache.get::<u32>("k", false).unwrap().as_deref(), Some(&7));
	assert_eq!(cache.policy("k"), Some(CachePolicy::CHECKPOINT_LOCAL));
}

#[test]
fn erase_and_clear() {
	let cache = CacheMap::new();
	cache.set("a", 1_i32, CachePolicy::NONE).unwrap();
	cache.set("b", 2_i32, CachePolicy::NONE).unwrap();
	assert!(cache.erase("a").unwrap());
	assert!(!cache.erase("a").unwrap());
	assert_eq!(cache.get_keys(), vec!["b".to_string()]);
	cache.clear();
	assert_eq!(cache.size(), 0);
}

#[test]
fn opaque_values_are_not_serializable() {
	let cache = CacheMap::new();
	cache.set("o", Opaque(9), CachePolicy::NONE).unwrap();
	let holder = cache.holder("o").unwrap();
	assert!(!holder.is_serializable());
	assert!(!holder.is_hashable());
	assert!(matches!(holder.to_byte_array(), Err(CacheError::NotSerializable { .. })));
	assert!(matches!(holder.my_hash(), Err(CacheError::NotHashable { .. })));
	assert_eq!(cache.get::<Opaque>("o", false).unwrap().map(|o| o.0), Some(9));
}

#[test]
fn serialized_placeholder_materializes_on_matching_get() {
	let cache = CacheMap::new();
	let value = Energy {
		total: -76.02,
		label: "scf".into(),
	};
	let live = Holder::new(value.clone());
	let meta = EntryMeta::describe(&live, CachePolicy::CHECKPOINT_GLOBAL);
	let bytes = live.to_byte_array().unwrap();
	cache
		.set_holder("e", Arc::new(SerializedHolder::new(meta, bytes)), CachePolicy::CHECKPOINT_GLOBAL)
		.unwrap();

	assert_eq!(cache.holder("e").unwrap().value_type_id(), None);
	assert!(cache.get::<String>("e", false).unwrap().is_none());
	assert_eq!(cache.get::<Energy>("e", false).unwrap().as_deref(), Some(&value));
	assert_eq!(cache.holder("e").unwrap().value_type_id(), Some(std::any::TypeId::of::<Energy>()));
}

#[test]
fn serialized_decode_checks_type_and_hash() {
	let live = Holder::new(42_i64);
	let bytes = live.to_byte_array().unwrap();
	let meta = EntryMeta::describe(&live, CachePolicy::NONE);
	let serialized = SerializedHolder::new(meta.clone(), bytes.clone());

	assert!(matches!(serialized.decode::<u64>(), Err(CacheError::TypeMismatch { .. })));
	assert_eq!(**serialized.decode::<i64>().unwrap().value(), 42);

	let tampered = SerializedHolder::new(
		EntryMeta {
			hash: Some(hash_bytes(b"other")),
			..meta
		},
		bytes,
	);
	assert!(matches!(tampered.decode::<i64>(), Err(CacheError::HashMismatch { .. })));
}

#[test]
fn print_lists_sorted_entries() {
	let cache = CacheMap::new();
	cache.set("b", Opaque(0), CachePolicy::NONE).unwrap();
	cache.set("a", 1_i32, CachePolicy::NONE).unwrap();
	let mut out = Vec::new();
	cache.print(&mut out).unwrap();
	let text = String::from_utf8(out).unwrap();
	let lines: Vec<&str> = text.lines().collect();
	assert_eq!(lines.len(), 2);
	assert_eq!(lines[0], "a -> true -> i32");
	assert!(lines[1].starts_with("b -> false -> "));
}

#[test]
fn sync_requires_communicator() {
	let cache = CacheMap::new();
	assert!(matches!(cache.start_sync(10), Err(CacheError::NoCommunicator)));
	assert!(matches!(cache.stop_sync(), Err(CacheError::SyncInactive)));
	assert!(!cache.is_syncing());
}

#[test]
fn slices_are_isolated_by_scope() {
	let cache = CacheMap::new();
	let a = cache.slice("EnergyCalc_v1.0");
	let b = cache.slice("Gradient_v2");
	a.set("result", 1.0_f64, CachePolicy::NONE).unwrap();
	b.set("result", 2.0_f64, CachePolicy::NONE).unwrap();

	assert_eq!(a.get::<f64>("result", false).unwrap().as_deref(), Some(&1.0));
	assert_eq!(b.get::<f64>("result", false).unwrap().as_deref(), Some(&2.0));
	assert_eq!(cache.count("EnergyCalc_v1.0:result"), 1);
	assert_eq!(a.keys().unwrap(), vec!["result".to_string()]);
	assert!(a.erase("result").unwrap());
	assert_eq!(a.count("result").unwrap(), 0);
	assert_eq!(b.count("result").unwrap(), 1);
}

#[test]
fn slice_detaches_when_map_is_dropped() {
	let cache = CacheMap::new();
	let slice = cache.slice("scope");
	drop(cache);
	assert!(matches!(slice.count("x"), Err(CacheError::Detached { scope }) if scope == "scope"));
}

proptest! {
	#[test]
	fn prop_serialized_roundtrip_matches_live(values in proptest::collection::vec(-1.0e6_f64..1.0e6, 0..32)) {
		let live = Holder::new(values.clone());
		let meta = EntryMeta::describe(&live, CachePolicy::NONE);
		let serialized = SerializedHolder::new(meta, live.to_byte_array().unwrap());
		prop_assert_eq!(serialized.my_hash().unwrap(), live.my_hash().unwrap());
		let decoded = serialized.decode::<Vec<f64>>().unwrap();
		prop_assert_eq!(&**decoded.value(), &values);
	}
}
