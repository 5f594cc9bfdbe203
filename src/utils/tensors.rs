use burn::tensor::{backend::Backend, Data, ElementConversion, Int, Shape, Tensor};

/// Pad each row to `seq_length` with `pad_value` and stack the rows into a 2D int tensor
pub fn pad_to<B: Backend>(
    pad_value: i64,
    rows: Vec<Vec<i64>>,
    seq_length: usize,
    device: &B::Device,
) -> Tensor<B, 2, Int> {
    let batch_size = rows.len();

    let mut values = vec![pad_value; batch_size * seq_length];

    for (index, row) in rows.into_iter().enumerate() {
        let offset = index * seq_length;

        for (column, value) in row.into_iter().take(seq_length).enumerate() {
            values[offset + column] = value;
        }
    }

    int_tensor::<B, 2>(values, [batch_size, seq_length], device)
}

/// Build an int tensor of the given shape from row-major host values
pub fn int_tensor<B: Backend, const D: usize>(
    values: Vec<i64>,
    shape: [usize; D],
    device: &B::Device,
) -> Tensor<B, D, Int> {
    let data: Data<B::IntElem, D> = Data::new(
        values.into_iter().map(|value| value.elem()).collect(),
        Shape::new(shape),
    );

    Tensor::from_data(data, device)
}

/// Read an int tensor back to the host as a flat, row-major vector
pub fn int_values<B: Backend, const D: usize>(tensor: Tensor<B, D, Int>) -> Vec<i64> {
    tensor.into_data().convert::<i64>().value
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn pads_short_rows_and_truncates_long_rows() {
        let device = Default::default();

        let tensor = pad_to::<NdArray>(9, vec![vec![1, 2], vec![3, 4, 5, 6]], 3, &device);

        assert_eq!(tensor.dims(), [2, 3]);
        assert_eq!(int_values(tensor), vec![1, 2, 9, 3, 4, 5]);
    }
}
