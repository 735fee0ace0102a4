#[cfg(not(windows))]
mod fuzz {
    use bootparam::{
        cmdline::memory::{self, MEM_OFFLINE_NODE, OFFLINE_SIZES_PROP},
        format::fdt::DeviceTree,
    };
    use honggfuzz::fuzz;

    pub fn main() {
        loop {
            fuzz!(|data: &[u8]| {
                if let Ok(tree) = DeviceTree::new(data) {
                    let _ = tree.property(MEM_OFFLINE_NODE, OFFLINE_SIZES_PROP);
                    let _ = tree.property("/", "model");
                }

                let _ = memory::offline_sizes(data);
            });
        }
    }
}

fn main() {
    #[cfg(not(windows))]
    fuzz::main();
}
