// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

/// This macro implements the `Iterator` trait for type `$target`. The
/// iterator's `Item` type is `Result<$item, DiffError>`.
///
/// The `target` type must provide two things:
/// 1. A boolean field named `is_done`. If this field is set to true,
///    iteration will end.
/// 2. A method named `next_impl`, which is where the actual iteration
///    is implemented.
///
/// The `next_impl` method returns `Result<Option<$item>, DiffError>`.
/// If `next_impl` returns `Ok(Some(_))`, that value is yielded. If it
/// returns `Ok(None)`, `next_impl` will be called again unless it also
/// set `is_done`. If it returns `Err(_)`, the error will be yielded and
/// `is_done` will be set to true.
///
/// The main benefit is that `next_impl` can use normal error
/// propagation with `?`. Without this macro, each error case would have
/// to set `is_done` before yielding the error.
macro_rules! impl_result_iter {
    ($target:ty, $item:ident) => {
        impl Iterator for $target {
            type Item = Result<$item, DiffError>;

            fn next(&mut self) -> Option<Result<$item, DiffError>> {
                loop {
                    if self.is_done {
                        return None;
                    }

                    match self.next_impl() {
                        Ok(Some(entry)) => return Some(Ok(entry)),
                        Ok(None) => {
                            // Continue.
                        }
                        Err(err) => {
                            self.is_done = true;
                            return Some(Err(err));
                        }
                    }
                }
            }
        }
    };
}
