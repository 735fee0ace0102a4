#[cfg(not(windows))]
mod fuzz {
    use bootparam::format::bootconfig;
    use honggfuzz::fuzz;

    pub fn main() {
        loop {
            fuzz!(|data: &[u8]| {
                let _ = bootconfig::parse_trailer(data, data.len());

                if let Some((&split, rest)) = data.split_first() {
                    let split = usize::from(split).min(rest.len());
                    let (params, region) = rest.split_at(split);

                    let mut buf = region.to_vec();
                    buf.resize(buf.len() + params.len() + 64, 0);

                    if let Ok(end) = bootconfig::append_parameters(&mut buf, 0, region.len(), params)
                    {
                        assert!(bootconfig::trailer_present(&buf, end));
                        bootconfig::parse_trailer(&buf, end).unwrap();
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
