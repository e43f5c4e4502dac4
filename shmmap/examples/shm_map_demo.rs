use shmmap::{F64Map, U64Map};

fn main() {
    println!("=== ShmHashMap Demo ===\n");

    // Example 1: Basic insert/lookup/remove
    demo_basic_ops();

    // Example 2: Materializing defaults for counters
    demo_default_counters();

    // Example 3: Freeze, then attach by address without copying
    demo_freeze_and_attach();

    // Example 4: Publish through a file and map it back
    demo_file_publish();
}

fn demo_basic_ops() {
    println!("1. Basic operations:");
    let mut map = U64Map::new();

    for key in 0..5u64 {
        map.set(key, key * key).unwrap();
        println!("   Stored {} -> {}", key, key * key);
    }
    println!("   Table length: {}", map.len());
    println!("   Slot count: {}", map.slot_count());

    map.remove(3).unwrap();
    println!("   Removed key 3, length now {}", map.len());

    for (key, value) in &map {
        println!("   Iterated {} -> {}", key, value);
    }

    match map.get(3) {
        Ok(value) => println!("   Unexpected value for 3: {}", value),
        Err(e) => println!("   Lookup of 3 fails as it should: {}", e),
    }
    println!();
}

fn demo_default_counters() {
    println!("2. Materializing defaults:");
    let mut hits = U64Map::with_default(0);

    // every indexed read of an absent page springs a zero into existence
    for page in [3u64, 7, 3, 3, 9, 7] {
        let seen = hits.get_or_insert_default(page).unwrap();
        hits.set(page, seen + 1).unwrap();
    }
    for (page, count) in &hits {
        println!("   Page {page}: {count} hits");
    }

    // get_or reads with a fallback but never inserts
    let mut scores = F64Map::new();
    scores.set(1, 98.5).unwrap();
    println!("   Player 1 score: {}", scores.get_or(1, 0.0));
    println!("   Player 2 score: {}", scores.get_or(2, 0.0));
    println!("   Tracked players: {}", scores.len());
    println!();
}

fn demo_freeze_and_attach() {
    println!("3. Freeze and attach:");
    let mut table = U64Map::new();
    for key in 0..5u64 {
        table.set(key, key + 100).unwrap();
    }
    table.make_readonly().unwrap();
    println!("   Frozen table of {} entries", table.len());

    match table.set(9, 9) {
        Ok(()) => println!("   Unexpected write success"),
        Err(e) => println!("   Writes now fail: {}", e),
    }

    // another party attaches to the same bytes without copying; the pointer
    // stays valid because `table` outlives `view`
    let view = unsafe { U64Map::from_ptr(table.buffer_ptr()).unwrap() };
    println!(
        "   Attached view: {} entries, borrowed: {}",
        view.len(),
        view.is_borrowed()
    );
    for key in 0..5u64 {
        assert_eq!(view.get(key).unwrap(), table.get(key).unwrap());
    }
    println!("   View agrees with the source on every key");
    println!();
}

fn demo_file_publish() {
    println!("4. Publish through a file:");
    let dir = std::env::temp_dir().join("shmmap-demo");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("table.shm");

    // a path under /dev/shm would keep the exchange entirely in memory
    {
        let mut writer = U64Map::with_capacity_in(64, &path).unwrap();
        for key in 0..10u64 {
            writer.set(key, key * 1000).unwrap();
        }
        writer.make_readonly().unwrap();
        println!(
            "   Published {} entries ({} bytes) to {}",
            writer.len(),
            writer.buffer_size(),
            path.display()
        );
    }

    let reader = U64Map::open(&path).unwrap();
    println!("   Reader sees {} entries, readonly: {}", reader.len(), reader.is_readonly());
    assert_eq!(reader.get(7).unwrap(), 7000);
    println!("   Spot check: 7 -> {}", reader.get(7).unwrap());

    std::fs::remove_file(&path).unwrap();
}
