use pretty_assertions::assert_eq;
use pulsar_cache::CachePolicy;
use pulsar_options::{OptionEntry, OptionKind};

use super::*;
use crate::{ConstructModule, CreationFuncs, ModuleCore};

struct EnergyCalc {
	core: ModuleCore,
}

impl Module for EnergyCalc {
	fn core(&self) -> &ModuleCore {
		&self.core
	}

	fn core_mut(&mut self) -> &mut ModuleCore {
		&mut self.core
	}
}

impl ConstructModule for EnergyCalc {
	fn construct(id: ModuleId) -> Self {
		Self { core: ModuleCore::new(id) }
	}
}

impl EnergyCalc {
	fn run(&self, scale: u8) -> Result<()> {
		self.core.print("computing energy\n");
		self.core
			.set_final_state(ComputationState::from_bytes(vec![scale; 2]))?;
		self.core.cache()?.set("scf_energy", -76.0 * f64::from(scale), CachePolicy::NONE)?;
		Ok(())
	}
}

struct Gradient {
	core: ModuleCore,
}

impl Module for Gradient {
	fn core(&self) -> &ModuleCore {
		&self.core
	}

	fn core_mut(&mut self) -> &mut ModuleCore {
		&mut self.core
	}
}

impl ConstructModule for Gradient {
	fn construct(id: ModuleId) -> Self {
		Self { core: ModuleCore::new(id) }
	}
}

/// Serves fixed creator tables without touching the filesystem.
struct StaticLoader {
	tables: FxHashMap<String, CreationFuncs>,
}

impl SupermoduleLoader for StaticLoader {
	fn kind(&self) -> SupermoduleKind {
		SupermoduleKind::Native
	}

	fn load_supermodule(&mut self, path: &str) -> Result<&CreationFuncs> {
		self.tables.get(path).ok_or_else(|| ModuleError::Load {
			path: path.to_string(),
			reason: "not found".to_string(),
		})
	}

	fn loaded_paths(&self) -> Vec<String> {
		self.tables.keys().cloned().collect()
	}
}

const LIB: &str = "/opt/pulsar/libchem.so";

fn manager() -> ModuleManager {
	let mut funcs = CreationFuncs::new();
	funcs.add_native_creator::<EnergyCalc>("EnergyCalc");
	funcs.add_native_creator::<Gradient>("Gradient");
	funcs.add_creator("Panics", |_| panic!("basis set not found"));
	funcs.add_creator("Fails", |_| Err(ModuleError::Foreign("no memory".into())));
	funcs.add_creator("Null", |_| Ok(ModuleHandle::empty()));
	let loader = StaticLoader {
		tables: [(LIB.to_string(), funcs)].into_iter().collect(),
	};
	ModuleManager::builder().loader(Box::new(loader)).build()
}

fn energy_info(version: &str, required: bool) -> ModuleInfo {
	let mut options = OptionMap::new();
	let entry = OptionEntry::new(OptionKind::Float).help("convergence threshold");
	options.insert("precision", if required { entry.required() } else { entry.default(1e-4) }).unwrap();
	ModuleInfo::new("EnergyCalc", SupermoduleKind::Native, LIB)
		.with_base("EnergyMethod")
		.with_version(version)
		.with_options(options)
}

#[test]
fn energy_calc_scenario() {
	let mm = manager();
	mm.load_module_from_minfo(energy_info("1.0", true), "m1").unwrap();
	assert!(mm.has_key("m1"));

	assert!(matches!(mm.create_module::<EnergyCalc>("m1", None), Err(ModuleError::Validation { .. })));
	assert_eq!(mm.tree_len(), 0);
	assert_eq!(mm.times_created("m1").unwrap(), 0);

	mm.change_option("m1", "precision", 1e-6).unwrap();
	let module = mm.create_module::<EnergyCalc>("m1", None).unwrap();
	assert_eq!(module.core().id(), FIRST_MODULE_ID);
	assert_eq!(module.core().key().unwrap(), "m1");
	assert_eq!(module.core().options().unwrap().get::<f64>("precision").unwrap(), 1e-6);
	assert_eq!(mm.module_key_info("m1").unwrap().options.get::<f64>("precision").unwrap(), 1e-6);
	assert_eq!(mm.times_created("m1").unwrap(), 1);

	assert!(matches!(
		mm.change_option("m1", "precision", 1e-7),
		Err(ModuleError::InUse { times_created: 1, .. })
	));
}

#[test]
fn duplicate_key_starts_unused() {
	let mm = manager();
	mm.load_module_from_minfo(energy_info("1.0", false), "m1").unwrap();
	drop(mm.create_module::<EnergyCalc>("m1", None).unwrap());

	mm.duplicate_key("m1", "m1b").unwrap();
	assert_eq!(mm.times_created("m1b").unwrap(), 0);
	mm.change_option("m1b", "precision", 2e-6).unwrap();
	assert!(mm.change_option("m1", "precision", 2e-6).is_err());
	assert_eq!(mm.module_key_info("m1").unwrap().options.get::<f64>("precision").unwrap(), 1e-4);

	assert!(matches!(mm.duplicate_key("m1", "m1b"), Err(ModuleError::DuplicateKey(k)) if k == "m1b"));
	assert!(matches!(mm.duplicate_key("nope", "m2"), Err(ModuleError::MissingKey(k)) if k == "nope"));
	assert_eq!(mm.keys(), vec!["m1".to_string(), "m1b".to_string()]);
}

#[test]
fn load_rejects_bad_descriptors_without_mutation() {
	let mm = manager();
	mm.load_module_from_minfo(energy_info("1.0", false), "m1").unwrap();
	assert!(matches!(
		mm.load_module_from_minfo(energy_info("2.0", false), "m1"),
		Err(ModuleError::DuplicateKey(_))
	));
	assert_eq!(mm.module_key_info("m1").unwrap().version, "1.0");

	let no_path = ModuleInfo::new("EnergyCalc", SupermoduleKind::Native, "");
	assert!(matches!(mm.load_module_from_minfo(no_path, "a"), Err(ModuleError::Load { .. })));

	let script = ModuleInfo::new("EnergyCalc", SupermoduleKind::Interpreted, "chem.py");
	assert!(matches!(
		mm.load_module_from_minfo(script, "b"),
		Err(ModuleError::UnknownLoader {
			kind: SupermoduleKind::Interpreted,
			..
		})
	));

	let unknown = ModuleInfo::new("Nope", SupermoduleKind::Native, LIB);
	assert!(matches!(mm.load_module_from_minfo(unknown, "c"), Err(ModuleError::MissingCreator { .. })));
	assert_eq!(mm.size(), 1);
}

#[test]
fn creation_failures_leave_no_trace() {
	let mm = manager();
	for (key, name) in [("p", "Panics"), ("f", "Fails"), ("n", "Null"), ("g", "Gradient")] {
		mm.load_module_from_minfo(ModuleInfo::new(name, SupermoduleKind::Native, LIB), key).unwrap();
	}

	let err = mm.create_module_foreign("p", None).unwrap_err();
	assert!(matches!(&err, ModuleError::Creation { reason, .. } if reason == "basis set not found"));
	assert!(matches!(mm.create_module_foreign("f", None), Err(ModuleError::Creation { .. })));
	assert!(matches!(mm.create_module_foreign("n", None), Err(ModuleError::NullModule { .. })));
	assert!(matches!(mm.create_module::<EnergyCalc>("g", None), Err(ModuleError::TypeMismatch { .. })));
	assert!(matches!(mm.create_module::<EnergyCalc>("missing", None), Err(ModuleError::MissingKey(_))));

	assert_eq!(mm.tree_len(), 0);
	for key in ["p", "f", "n", "g"] {
		assert_eq!(mm.times_created(key).unwrap(), 0);
	}

	// Ids consumed by failed attempts are not reused.
	let ok = mm.create_module::<Gradient>("g", None).unwrap();
	assert!(ok.core().id() > FIRST_MODULE_ID);
}

#[test]
fn missing_parent_is_rejected() {
	let mm = manager();
	mm.load_module_from_minfo(energy_info("1.0", false), "m1").unwrap();
	assert!(matches!(
		mm.create_module::<EnergyCalc>("m1", Some(7)),
		Err(ModuleError::MissingParent { id: 7 })
	));
	assert_eq!(mm.tree_len(), 0);
	assert_eq!(mm.times_created("m1").unwrap(), 0);
}

#[test]
fn children_inherit_parent_state() {
	let mm = manager();
	mm.load_module_from_minfo(energy_info("1.0", false), "m1").unwrap();

	let parent = mm.create_module::<EnergyCalc>("m1", None).unwrap();
	parent.run(3).unwrap();
	let early = parent.core().create_child::<EnergyCalc>("m1").unwrap();
	assert_eq!(early.core().initial_state().unwrap(), ComputationState::empty());
	assert_eq!(mm.tree_node(early.core().id()).unwrap().parent(), Some(parent.core().id()));

	let parent_id = parent.core().id();
	drop(parent);
	assert!(!mm.tree_node(parent_id).unwrap().in_use());

	let late = mm.create_module::<EnergyCalc>("m1", Some(parent_id)).unwrap();
	assert_eq!(late.core().initial_state().unwrap(), ComputationState::from_bytes(vec![3, 3]));
	assert_eq!(late.core().final_state().unwrap(), ComputationState::from_bytes(vec![3, 3]));
	assert_eq!(mm.in_use_count(), 2);
	assert_eq!(mm.with_tree(|tree| tree.children(parent_id).len()), 2);
}

#[test]
fn cache_scopes_follow_name_and_version() {
	let mm = manager();
	mm.load_module_from_minfo(energy_info("1.0", false), "v1").unwrap();
	mm.load_module_from_minfo(energy_info("1.0", false), "v1_again").unwrap();
	mm.load_module_from_minfo(energy_info("2.0", false), "v2").unwrap();

	mm.create_module::<EnergyCalc>("v1", None).unwrap().run(1).unwrap();
	mm.create_module::<EnergyCalc>("v2", None).unwrap().run(2).unwrap();

	let again = mm.create_module::<EnergyCalc>("v1_again", None).unwrap();
	let shared = again.core().cache().unwrap().get::<f64>("scf_energy", false).unwrap();
	assert_eq!(shared.as_deref(), Some(&-76.0));
	assert_eq!(mm.cache().get_keys(), vec!["EnergyCalc_v1.0:scf_energy".to_string(), "EnergyCalc_v2.0:scf_energy".to_string()]);
}

#[test]
fn output_is_captured_per_node() {
	let mm = manager();
	mm.load_module_from_minfo(energy_info("1.0", false), "m1").unwrap();
	mm.enable_debug("m1", true).unwrap();
	assert!(mm.enable_debug("nope", true).is_err());

	let module = mm.create_module::<EnergyCalc>("m1", None).unwrap();
	assert!(module.core().debug_enabled());
	module.run(1).unwrap();
	module.core().print("done\n");
	assert_eq!(mm.tree_node(module.core().id()).unwrap().output(), "computing energy\ndone\n");

	mm.enable_debug("m1", false).unwrap();
	assert!(!mm.create_module::<EnergyCalc>("m1", None).unwrap().core().debug_enabled());
	mm.enable_debug_all(true);
	assert!(mm.create_module::<EnergyCalc>("m1", None).unwrap().core().debug_enabled());
}

#[test]
fn expert_mode_bypasses_validation() {
	let mm = manager();
	mm.load_module_from_minfo(energy_info("1.0", true), "m1").unwrap();
	mm.set_expert("m1", true).unwrap();
	let module = mm.create_module::<EnergyCalc>("m1", None).unwrap();
	assert!(!module.core().options().unwrap().has_value("precision"));
}

#[test]
fn test_all_reports_and_skips_invalid_keys() {
	let mm = manager();
	mm.load_module_from_minfo(energy_info("1.0", true), "needs_precision").unwrap();
	mm.load_module_from_minfo(energy_info("1.0", false), "ready").unwrap();

	let report = mm.test_all().unwrap();
	assert_eq!(report.len(), 1);
	assert_eq!(report[0].0, "needs_precision");
	assert_eq!(mm.times_created("ready").unwrap(), 1);
	assert_eq!(mm.times_created("needs_precision").unwrap(), 0);
	assert_eq!(mm.in_use_count(), 0);

	mm.load_module_from_minfo(ModuleInfo::new("Fails", SupermoduleKind::Native, LIB), "broken").unwrap();
	assert!(matches!(mm.test_all(), Err(ModuleError::Creation { .. })));
}

#[test]
fn unique_keys_do_not_collide() {
	let mm = manager();
	mm.load_module_from_minfo(energy_info("1.0", false), "m1").unwrap();
	let key = mm.generate_unique_key();
	assert!(!mm.has_key(&key));
	mm.duplicate_key("m1", &key).unwrap();
	assert_ne!(mm.generate_unique_key(), key);
}

#[test]
fn concurrent_creation_assigns_unique_ids() {
	const THREADS: usize = 8;
	const PER_THREAD: usize = 50;
	let mm = manager();
	let keys = ["k0", "k1", "k2", "k3"];
	for key in keys.iter().chain(&["idle"]) {
		mm.load_module_from_minfo(energy_info("1.0", false), key).unwrap();
	}

	let ids: Vec<ModuleId> = std::thread::scope(|scope| {
		let tuner = scope.spawn(|| {
			for step in 1..=PER_THREAD {
				mm.change_option("idle", "precision", step as f64).unwrap();
				match mm.change_option("k0", "precision", 1.0) {
					Ok(()) | Err(ModuleError::InUse { .. }) => {}
					Err(e) => panic!("unexpected error: {e}"),
				}
			}
		});
		let workers: Vec<_> = (0..THREADS)
			.map(|thread| {
				let mm = &mm;
				let key = keys[thread % keys.len()];
				scope.spawn(move || {
					(0..PER_THREAD)
						.map(|_| mm.create_module::<EnergyCalc>(key, None).unwrap().core().id())
						.collect::<Vec<_>>()
				})
			})
			.collect();
		tuner.join().unwrap();
		workers.into_iter().flat_map(|worker| worker.join().unwrap()).collect()
	});

	let unique: FxHashSet<ModuleId> = ids.iter().copied().collect();
	assert_eq!(unique.len(), THREADS * PER_THREAD);
	assert!(ids.iter().all(|&id| id >= FIRST_MODULE_ID));
	assert_eq!(mm.tree_len(), THREADS * PER_THREAD);
	assert_eq!(mm.in_use_count(), 0);
	for key in keys {
		assert_eq!(mm.times_created(key).unwrap(), (THREADS / keys.len() * PER_THREAD) as u64);
	}
	assert_eq!(mm.times_created("idle").unwrap(), 0);
	assert_eq!(
		mm.module_key_info("idle").unwrap().options.get::<f64>("precision").unwrap(),
		PER_THREAD as f64
	);
}

#[test]
fn modules_detach_when_manager_drops() {
	let mm = manager();
	mm.load_module_from_minfo(energy_info("1.0", false), "m1").unwrap();
	let module = mm.create_module::<EnergyCalc>("m1", None).unwrap();
	drop(mm);
	assert!(matches!(module.core().create_child::<EnergyCalc>("m1"), Err(ModuleError::Detached { .. })));
	assert!(matches!(
		module.core().cache().unwrap().count("x"),
		Err(pulsar_cache::CacheError::Detached { .. })
	));
	assert_eq!(module.core().key().unwrap(), "m1");
}

#[test]
fn config_registers_and_overrides() {
	let config = ManagerConfig::from_toml_str(&format!(
		r#"
		[[module]]
		key = "m1"
		name = "EnergyCalc"
		type = "native"
		path = "{LIB}"
		version = "1.0"
		debug = true

		[module.options.precision]
		kind = "float"
		required = true
		help = "convergence threshold"

		[module.options.max_iter]
		kind = "int"
		default = 50

		[module.set]
		precision = 1e-8
		"#
	))
	.unwrap();

	let mm = manager();
	mm.load_config(&config).unwrap();
	let info = mm.module_key_info("m1").unwrap();
	assert_eq!(info.options.get::<f64>("precision").unwrap(), 1e-8);
	assert_eq!(info.options.get::<i64>("max_iter").unwrap(), 50);
	assert!(mm.create_module::<EnergyCalc>("m1", None).unwrap().core().debug_enabled());

	let mut listing = Vec::new();
	mm.print(&mut listing).unwrap();
	let listing = String::from_utf8(listing).unwrap();
	assert!(listing.starts_with(&format!("m1: EnergyCalc v1.0 [native] {LIB}")));
	assert!(listing.contains("precision (float)"));
}

#[test]
fn config_rejects_mistyped_defaults() {
	let config = ManagerConfig::from_toml_str(&format!(
		r#"
		[[module]]
		key = "m1"
		name = "EnergyCalc"
		type = "native"
		path = "{LIB}"

		[module.options.precision]
		kind = "float"
		default = "tight"
		"#
	))
	.unwrap();
	let mm = manager();
	assert!(matches!(mm.load_config(&config), Err(ModuleError::Option { key, .. }) if key == "m1"));
	assert!(!mm.has_key("m1"));
}

#[test]
fn config_override_failure_registers_nothing() {
	let config = ManagerConfig::from_toml_str(&format!(
		r#"
		[[module]]
		key = "m1"
		name = "EnergyCalc"
		type = "native"
		path = "{LIB}"

		[module.options.precision]
		kind = "float"
		default = 1e-4

		[module.set]
		precision = "tight"
		"#
	))
	.unwrap();
	let mm = manager();
	assert!(matches!(mm.load_config(&config), Err(ModuleError::Option { key, .. }) if key == "m1"));
	assert!(!mm.has_key("m1"));
	assert_eq!(mm.size(), 0);
}

#[test]
fn missing_loader_names_the_supermodule() {
	let mm = manager();
	let err = mm.load_supermodule(SupermoduleKind::Interpreted, "chem.py").unwrap_err();
	assert!(matches!(&err, ModuleError::UnknownLoader { path, .. } if path == "chem.py"));
	assert_eq!(err.to_string(), "no supermodule loader for kind 'interpreted' needed by chem.py");
}
