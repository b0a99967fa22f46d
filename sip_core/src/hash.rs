use core::fmt::Write;

use heapless::String;
use md5::Digest;

/// Lowercase hex MD5 of `data`.
pub type Md5Hex = String<32>;

/// Eight hex digit nonce-count as sent in `nc=`.
pub type Hex8 = String<8>;

pub fn md5_hex(data: &[u8]) -> Md5Hex {
    let digest = md5::Md5::digest(data);
    let mut out = Md5Hex::new();
    for b in &digest {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

/// Keeps the 8 rightmost hex digits of `num`, zero padded.
pub fn hex8(num: u32) -> Hex8 {
    let mut out = Hex8::new();
    let _ = write!(out, "{:08x}", num);
    out
}

pub fn hex_encode(bytes: &[u8]) -> std::string::String {
    let mut out = std::string::String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}
