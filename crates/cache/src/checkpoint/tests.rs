use pretty_assertions::assert_eq;

use super::*;

fn populated() -> CacheMap {
	let cache = CacheMap::new();
	cache.set("local", 1_i64, CachePolicy::CHECKPOINT_LOCAL).unwrap();
	cache.set("global", vec![1.0_f64, 2.0], CachePolicy::CHECKPOINT_GLOBAL).unwrap();
	cache.set("both", "x".to_string(), CachePolicy::CHECKPOINT_LOCAL | CachePolicy::CHECKPOINT_GLOBAL).unwrap();
	cache.set("transient", 5_u32, CachePolicy::NONE).unwrap();
	cache
}

#[test]
fn memory_backend_basics() {
	let mut io = MemoryCheckpoint::new();
	io.write("a", b"1").unwrap();
	assert_eq!(io.count("a"), 1);
	assert_eq!(io.read("a").unwrap(), b"1");
	assert!(matches!(io.read("b"), Err(CacheError::MissingCheckpoint(key)) if key == "b"));
	io.erase("a").unwrap();
	assert_eq!(io.all_keys().unwrap(), Vec::<String>::new());
}

#[test]
fn save_filters_by_policy() {
	let cache = populated();
	let mut io = MemoryCheckpoint::new();
	assert_eq!(cache.save_checkpoint(&mut io, CachePolicy::CHECKPOINT_LOCAL).unwrap(), 2);
	assert_eq!(io.all_keys().unwrap(), vec!["both".to_string(), "local".to_string()]);
}

#[test]
fn load_restores_placeholders_without_overwriting() {
	let source = populated();
	let mut io = MemoryCheckpoint::new();
	source.save_checkpoint(&mut io, CachePolicy::CHECKPOINT_GLOBAL).unwrap();

	let target = CacheMap::new();
	target.set("both", "kept".to_string(), CachePolicy::NONE).unwrap();
	assert_eq!(target.load_checkpoint(&io).unwrap(), 1);
	assert_eq!(target.get::<Vec<f64>>("global", false).unwrap().as_deref(), Some(&vec![1.0, 2.0]));
	assert_eq!(target.policy("global"), Some(CachePolicy::CHECKPOINT_GLOBAL));
	assert_eq!(target.get::<String>("both", false).unwrap().as_deref().map(String::as_str), Some("kept"));
}

#[test]
fn directory_backend_round_trips_keys() {
	let dir = tempfile::tempdir().unwrap();
	let mut io = DirCheckpoint::open(dir.path().join("ckpt")).unwrap();
	io.write("EnergyCalc_v1.0:energy", b"abc").unwrap();
	io.write("plain", b"").unwrap();

	assert_eq!(io.count("plain"), 1);
	assert_eq!(io.read("EnergyCalc_v1.0:energy").unwrap(), b"abc");
	assert_eq!(io.all_keys().unwrap(), vec!["EnergyCalc_v1.0:energy".to_string(), "plain".to_string()]);

	io.erase("plain").unwrap();
	io.erase("plain").unwrap();
	assert!(matches!(io.read("plain"), Err(CacheError::MissingCheckpoint(_))));
	io.clear().unwrap();
	assert!(io.all_keys().unwrap().is_empty());
}

#[test]
fn checkpoint_pairs_local_and_global() {
	let dir = tempfile::tempdir().unwrap();
	let cache = populated();
	let mut ckpt = Checkpoint::new(Box::new(MemoryCheckpoint::new()), Box::new(DirCheckpoint::open(dir.path()).unwrap()));
	assert_eq!(ckpt.save_local_cache(&cache).unwrap(), 2);
	assert_eq!(ckpt.save_global_cache(&cache).unwrap(), 2);
	assert_eq!(ckpt.global().all_keys().unwrap(), vec!["both".to_string(), "global".to_string()]);

	let restored = CacheMap::new();
	assert_eq!(ckpt.load_local_cache(&restored).unwrap(), 2);
	assert_eq!(ckpt.load_global_cache(&restored).unwrap(), 1);
	assert_eq!(restored.get::<i64>("local", false).unwrap().as_deref(), Some(&1));
	assert!(restored.get::<u32>("transient", false).unwrap().is_none());
}
