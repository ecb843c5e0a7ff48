//! Loss functions shared by the trainers

use burn::{
    nn::loss::{BinaryCrossEntropyLossConfig, CrossEntropyLossConfig},
    tensor::{activation::log_softmax, backend::Backend, Int, Tensor},
};

/// Mean cross-entropy of `logits` `[batch, classes]` against class indices
pub fn cross_entropy<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
    CrossEntropyLossConfig::new()
        .init(&logits.device())
        .forward(logits, targets)
}

/// Mean binary cross-entropy on raw domain logits `[batch, 1]`
///
/// `domains` holds 0 (synthetic) or 1 (real) per sample.
pub fn domain_bce<B: Backend>(logits: Tensor<B, 2>, domains: Tensor<B, 1, Int>) -> Tensor<B, 1> {
    let [batch] = domains.dims();
    BinaryCrossEntropyLossConfig::new()
        .with_logits(true)
        .init(&logits.device())
        .forward(logits, domains.reshape([batch, 1]))
}

/// Symmetric KL divergence between the predictions on two views
///
/// `(KL(p || q) + KL(q || p)) / 2` with batch-mean reduction, where `p` and
/// `q` are the softmax of the weak and strong logits. Both directions sum to
/// `sum((p - q) * (log p - log q))`.
pub fn symmetric_kl<B: Backend>(weak_logits: Tensor<B, 2>, strong_logits: Tensor<B, 2>) -> Tensor<B, 1> {
    let [batch, _] = weak_logits.dims();

    let log_p = log_softmax(weak_logits, 1);
    let log_q = log_softmax(strong_logits, 1);
    let p = log_p.clone().exp();
    let q = log_q.clone().exp();

    ((p - q) * (log_p - log_q))
        .sum()
        .div_scalar(2.0 * batch.max(1) as f64)
}
