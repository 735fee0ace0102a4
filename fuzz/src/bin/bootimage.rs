#[cfg(not(windows))]
mod fuzz {
    use std::io::Cursor;

    use bootparam::{
        format::bootimage::{ImageHeader, VendorBootHeader, VendorRamdiskTable},
        stream::FromReader,
    };
    use honggfuzz::fuzz;

    pub fn main() {
        loop {
            fuzz!(|data: &[u8]| {
                let reader = Cursor::new(data);
                if let Ok(header) = ImageHeader::from_reader(reader) {
                    if let Ok(layout) = header.layout() {
                        for region in layout {
                            let _ = region.slice(data);
                        }
                    }

                    if let ImageHeader::Vendor(h @ VendorBootHeader::VendorV4 { .. }) = &header {
                        let _ = VendorRamdiskTable::decode(data, h);
                    }
                }
            });
        }
    }
}

fn main() {
    #[cfg(not(windows))]
    fuzz::main();
}
