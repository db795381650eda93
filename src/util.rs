pub fn allocate_vec(len: usize) -> Vec<u8> {
    vec![0u8; len]
}
