//! RFC 1071 internet checksum, plus the IPv6 pseudo-header variant
//! required for ICMPv6 (and therefore MLDv2) messages.

use std::net::Ipv6Addr;

fn sum_words(data: &[u8], mut sum: u32) -> u32 {
    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        sum += u32::from(u16::from_be_bytes([chunk[0], chunk[1]]));
    }
    if let [last] = chunks.remainder() {
        sum += u32::from(u16::from_be_bytes([*last, 0]));
    }
    sum
}

fn fold(mut sum: u32) -> u16 {
    while sum > 0xffff {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

/// Computes the ones-complement internet checksum of `data`.
///
/// The checksum field inside `data` must be zeroed before calling.
pub fn internet_checksum(data: &[u8]) -> u16 {
    fold(sum_words(data, 0))
}

/// Computes the ICMPv6 checksum of `message` using the IPv6 pseudo-header
/// for the given source and destination addresses.
pub fn icmpv6_checksum(src: &Ipv6Addr, dst: &Ipv6Addr, next_header: u8, message: &[u8]) -> u16 {
    let mut sum = sum_words(&src.octets(), 0);
    sum = sum_words(&dst.octets(), sum);
    sum += message.len() as u32;
    sum += u32::from(next_header);
    fold(sum_words(message, sum))
}

/// Verifies a message whose checksum field is populated; a correct
/// message sums to zero before complementing.
pub fn verify_internet_checksum(data: &[u8]) -> bool {
    internet_checksum(data) == 0
}

/// ICMPv6 counterpart of [`verify_internet_checksum`].
pub fn verify_icmpv6_checksum(src: &Ipv6Addr, dst: &Ipv6Addr, next_header: u8, message: &[u8]) -> bool {
    icmpv6_checksum(src, dst, next_header, message) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    #[test]
    fn checksum_of_zeroes_is_all_ones() {
        assert_eq!(internet_checksum(&[0, 0, 0, 0]), 0xffff);
    }

    #[test]
    fn rfc1071_example() {
        // Worked example from RFC 1071 section 3.
        let data = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        assert_eq!(internet_checksum(&data), !0xddf2);
    }

    #[test]
    fn odd_length_pads_with_zero() {
        assert_eq!(internet_checksum(&[0x12, 0x34, 0x56]), !0x6834_u16);
    }

    #[test]
    fn populated_checksum_verifies() {
        let mut data = vec![0x22, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01];
        let checksum = internet_checksum(&data);
        data[2..4].copy_from_slice(&checksum.to_be_bytes());
        assert!(verify_internet_checksum(&data));

        data[7] ^= 0xff;
        assert!(!verify_internet_checksum(&data));
    }

    #[test]
    fn icmpv6_checksum_includes_pseudo_header() {
        let src = Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1);
        let dst = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0x16);
        let mut message = vec![143, 0, 0, 0, 0, 0, 0, 0];

        let checksum = icmpv6_checksum(&src, &dst, 58, &message);
        message[2..4].copy_from_slice(&checksum.to_be_bytes());
        assert!(verify_icmpv6_checksum(&src, &dst, 58, &message));

        // A different source address must invalidate the checksum.
        let other = Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 2);
        assert!(!verify_icmpv6_checksum(&other, &dst, 58, &message));
    }
}
