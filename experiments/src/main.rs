use std::fs::File;
use std::io::BufWriter;
use std::time::SystemTime;

use memory_stats::memory_stats;
use tracing_flame::FlameLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

use synctree::{DecodeContext, DirtySet, IdMap, Map, PackOptions, Record, UnpackOptions};

#[derive(Debug, Clone, Default, synctree::Record)]
struct Leaf {
	_dirty: DirtySet,
	#[field(index = 1, oid)]
	_id: String,
	#[field(index = 2)]
	_value: i32,
	#[field(index = 3)]
	_tags: Map<String, i32>,
}

#[derive(Debug, Clone, Default, synctree::Record)]
struct Tree {
	_dirty: DirtySet,
	#[field(index = 1, oid)]
	_id: String,
	#[field(index = 2)]
	_name: String,
	#[field(index = 3)]
	_children: IdMap<Leaf>,
}

fn setup_global_subscriber() -> impl Drop {
	let file = File::create("./trace.folded").unwrap();
	let flame_layer = FlameLayer::new(BufWriter::new(file)).with_file_and_line(false);
	let guard = flame_layer.flush_on_drop();

	let subscriber = Registry::default().with(flame_layer);

	tracing::subscriber::set_global_default(subscriber).expect("Could not set global default");
	guard
}

fn build_tree(leaf_count: usize) -> Tree {
	let mut tree = Tree::default();
	tree.set_id("root".to_owned());
	tree.set_name("profiling-tree".to_owned());
	for i in 0..leaf_count {
		let mut leaf = Leaf::default();
		leaf.set_id(format!("leaf-{i}"));
		leaf.set_value(i as i32);
		leaf.tags_mut().insert("shade".to_owned(), i as i32 % 4);
		tree.children_mut().add(leaf);
	}
	tree
}

fn main() {
	let _guard = setup_global_subscriber();

	let mut start = SystemTime::now();
	let mut tree = build_tree(10_000);

	println! {
		"Tree construction time: {:?}, RAM: {}MB",
		start.elapsed().unwrap(),
		memory_stats().unwrap().virtual_mem as f32 / 1_000_000.0,
	}

	start = SystemTime::now();
	let dict = tree.pack_dict(&PackOptions::new());
	println! {
		"Structural encode time: {:?}, RAM: {}MB",
		start.elapsed().unwrap(),
		memory_stats().unwrap().virtual_mem as f32 / 1_000_000.0,
	}

	start = SystemTime::now();
	let mut buf = Vec::new();
	tree.pack_bin(&PackOptions::new(), &mut buf).unwrap();
	println! {
		"Binary encode time: {:?}, size: {}B, RAM: {}MB",
		start.elapsed().unwrap(),
		buf.len(),
		memory_stats().unwrap().virtual_mem as f32 / 1_000_000.0,
	}

	start = SystemTime::now();
	let mut decoded = Tree::default();
	let mut ctx = DecodeContext::new();
	decoded.unpack_dict(&dict, &UnpackOptions::new(), &mut ctx).unwrap();
	let unsolved = ctx.into_unsolved();
	println! {
		"Structural decode time: {:?}, unresolved refs: {}, RAM: {}MB",
		start.elapsed().unwrap(),
		unsolved.len(),
		memory_stats().unwrap().virtual_mem as f32 / 1_000_000.0,
	}

	println!("Decoded children: {}", decoded.children().len());
}
