// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! A shared random-bit source for CID generation, path-validation challenge
//! values, and stateless-reset secrets.

/// A generator of random data. The two methods serve different use cases:
/// one for "public" data that may appear in the clear on the wire, and one
/// for "private" data that must remain secret. Splitting them reduces the
/// risk of predictability weaknesses in one leaking into the other.
pub trait Generator: 'static + Send {
    /// Fills `dest` with unpredictable bits that may be sent over the wire.
    fn public_random_fill(&mut self, dest: &mut [u8]);

    /// Fills `dest` with unpredictable bits that stay internal to the
    /// endpoint.
    fn private_random_fill(&mut self, dest: &mut [u8]);

    /// Returns `true` with probability `p`.
    fn gen_bool(&mut self, p: f64) -> bool;
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use crate::random;

    #[derive(Debug)]
    pub struct Generator {
        pub seed: u8,
        pub gen_bool_result: bool,
    }

    impl Default for Generator {
        fn default() -> Self {
            Self {
                seed: 123,
                gen_bool_result: false,
            }
        }
    }

    impl random::Generator for Generator {
        fn public_random_fill(&mut self, dest: &mut [u8]) {
            let seed = self.seed;
            for (i, elem) in dest.iter_mut().enumerate() {
                *elem = seed ^ i as u8;
            }
            self.seed = self.seed.wrapping_add(1)
        }

        fn private_random_fill(&mut self, dest: &mut [u8]) {
            let seed = u8::MAX - self.seed;
            for (i, elem) in dest.iter_mut().enumerate() {
                *elem = seed ^ i as u8;
            }
            self.seed = self.seed.wrapping_add(1)
        }

        fn gen_bool(&mut self, _p: f64) -> bool {
            self.gen_bool_result
        }
    }
}
