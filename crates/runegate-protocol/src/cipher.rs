//! Opcode keystream: a pair of ISAAC generators.
//!
//! Once a session is authenticated every opcode byte is shifted by one
//! byte of keystream: the sender adds, the receiver subtracts (mod 256).
//! This only hides opcodes from casual packet inspection. It provides no
//! confidentiality or integrity: payloads are sent in the clear, and the
//! seed itself crosses the wire during login.

use std::fmt;

const SIZE: usize = 256;
const GOLDEN_RATIO: u32 = 0x9e37_79b9;

/// Offset added to every seed word for the server's encoding stream.
pub const ENCODE_SEED_OFFSET: u32 = 50;

/// The ISAAC pseudorandom generator, consumed the way the game client
/// consumes it: a full block of results is generated at once and handed
/// out from the last index down to the first.
pub struct IsaacRandom {
    count: usize,
    results: [u32; SIZE],
    memory: [u32; SIZE],
    a: u32,
    b: u32,
    c: u32,
}

impl IsaacRandom {
    /// Creates a generator seeded with `seed`. Seed words past 256 are
    /// ignored; missing words are zero.
    pub fn new(seed: &[u32]) -> Self {
        let mut random = Self {
            count: 0,
            results: [0; SIZE],
            memory: [0; SIZE],
            a: 0,
            b: 0,
            c: 0,
        };
        for (slot, word) in random.results.iter_mut().zip(seed) {
            *slot = *word;
        }
        random.init();
        random
    }

    /// Returns the next 32-bit output, refilling the block when exhausted.
    pub fn next_u32(&mut self) -> u32 {
        if self.count == 0 {
            self.isaac();
            self.count = SIZE;
        }
        self.count -= 1;
        self.results[self.count]
    }

    /// Returns the next keystream byte (the low byte of the next output).
    pub fn next_byte(&mut self) -> u8 {
        self.next_u32() as u8
    }

    fn isaac(&mut self) {
        self.c = self.c.wrapping_add(1);
        self.b = self.b.wrapping_add(self.c);

        for i in 0..SIZE {
            let x = self.memory[i];
            self.a ^= match i & 3 {
                0 => self.a << 13,
                1 => self.a >> 6,
                2 => self.a << 2,
                _ => self.a >> 16,
            };
            self.a = self.a.wrapping_add(self.memory[(i + 128) & 0xff]);

            let y = self.memory[((x >> 2) & 0xff) as usize]
                .wrapping_add(self.a)
                .wrapping_add(self.b);
            self.memory[i] = y;
            self.b = self.memory[((y >> 10) & 0xff) as usize].wrapping_add(x);
            self.results[i] = self.b;
        }
    }

    fn init(&mut self) {
        let mut state = [GOLDEN_RATIO; 8];
        for _ in 0..4 {
            mix(&mut state);
        }

        // Two passes: first fold in the seed, then the memory itself.
        for pass in 0..2 {
            for i in (0..SIZE).step_by(8) {
                let source = if pass == 0 {
                    &self.results
                } else {
                    &self.memory
                };
                for (j, word) in state.iter_mut().enumerate() {
                    *word = word.wrapping_add(source[i + j]);
                }
                mix(&mut state);
                self.memory[i..i + 8].copy_from_slice(&state);
            }
        }

        self.isaac();
        self.count = SIZE;
    }
}

impl fmt::Debug for IsaacRandom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Generator state is key material; don't leak it into logs.
        f.debug_struct("IsaacRandom").finish_non_exhaustive()
    }
}

fn mix(s: &mut [u32; 8]) {
    s[0] ^= s[1] << 11;
    s[3] = s[3].wrapping_add(s[0]);
    s[1] = s[1].wrapping_add(s[2]);
    s[1] ^= s[2] >> 2;
    s[4] = s[4].wrapping_add(s[1]);
    s[2] = s[2].wrapping_add(s[3]);
    s[2] ^= s[3] << 8;
    s[5] = s[5].wrapping_add(s[2]);
    s[3] = s[3].wrapping_add(s[4]);
    s[3] ^= s[4] >> 16;
    s[6] = s[6].wrapping_add(s[3]);
    s[4] = s[4].wrapping_add(s[5]);
    s[4] ^= s[5] << 10;
    s[7] = s[7].wrapping_add(s[4]);
    s[5] = s[5].wrapping_add(s[6]);
    s[5] ^= s[6] >> 4;
    s[0] = s[0].wrapping_add(s[5]);
    s[6] = s[6].wrapping_add(s[7]);
    s[6] ^= s[7] << 8;
    s[1] = s[1].wrapping_add(s[6]);
    s[7] = s[7].wrapping_add(s[0]);
    s[7] ^= s[0] >> 9;
    s[2] = s[2].wrapping_add(s[7]);
    s[0] = s[0].wrapping_add(s[1]);
}

/// The two keystreams of one authenticated session.
///
/// Deliberately not `Clone`: a pair belongs to exactly one codec, and a
/// copied pair would desynchronise from the peer on first use.
#[derive(Debug)]
pub struct CipherKeystreamPair {
    encode_stream: IsaacRandom,
    decode_stream: IsaacRandom,
}

impl CipherKeystreamPair {
    /// Derives the server-side pair from the session keys the client sent
    /// in its login block.
    ///
    /// The decode stream is seeded with the keys as-is; the encode stream
    /// with every key increased by [`ENCODE_SEED_OFFSET`].
    pub fn derive(seed: [u32; 4]) -> Self {
        Self {
            encode_stream: IsaacRandom::new(&offset_seed(seed)),
            decode_stream: IsaacRandom::new(&seed),
        }
    }

    /// Derives the client-side mirror of [`derive`](Self::derive): the
    /// client encodes with the raw keys and decodes with the offset keys.
    pub fn derive_peer(seed: [u32; 4]) -> Self {
        Self {
            encode_stream: IsaacRandom::new(&seed),
            decode_stream: IsaacRandom::new(&offset_seed(seed)),
        }
    }

    /// Next byte of the stream used to obfuscate outgoing opcodes.
    pub fn next_encode_byte(&mut self) -> u8 {
        self.encode_stream.next_byte()
    }

    /// Next byte of the stream used to recover incoming opcodes.
    pub fn next_decode_byte(&mut self) -> u8 {
        self.decode_stream.next_byte()
    }
}

fn offset_seed(seed: [u32; 4]) -> [u32; 4] {
    seed.map(|word| word.wrapping_add(ENCODE_SEED_OFFSET))
}
