/// Activation functions shared by the forward and backward kernels
///
/// Selected per layer by a small integer code:
/// - 0: Linear (also the fallback for unknown codes)
/// - 1: ReLU
/// - 2: TanH
/// - 3: Sigmoid, 1/(1 + e^-x)
/// - 4: PNSigmoid, the sigmoid stretched to (-1, 1): 2/(1 + e^-x) - 1
///
/// Both functions take the PRE-activation value. `derivative` recomputes the
/// activation internally where it needs it (TanH, Sigmoid), so callers must never pass an
/// already-activated output.
///
/// No clamping: TanH is evaluated as (e^x - e^-x)/(e^x + e^-x), so |x| beyond ~88
/// overflows to inf/inf = NaN, and that NaN flows through unchanged.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Activation {
    #[default]
    Linear,
    ReLU,
    TanH,
    Sigmoid,
    PNSigmoid,
}

impl Activation {
    #[inline]
    pub fn activate(&self, x: f32) -> f32 {
        match self {
            Activation::Linear => x,
            Activation::ReLU => {
                if x > 0.0 {
                    x
                } else {
                    0.0
                }
            }
            Activation::TanH => {
                let exp_p = x.exp();
                let exp_n = (-x).exp();
                (exp_p - exp_n) / (exp_p + exp_n)
            }
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Activation::PNSigmoid => 2.0 / (1.0 + (-x).exp()) - 1.0,
        }
    }

    #[inline]
    pub fn derivative(&self, x: f32) -> f32 {
        match self {
            Activation::Linear => 1.0,
            Activation::ReLU => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::TanH => {
                let activated = self.activate(x);
                1.0 - activated * activated
            }
            Activation::Sigmoid => {
                let activated = self.activate(x);
                activated * (1.0 - activated)
            }
            Activation::PNSigmoid => {
                let exp = x.exp();
                2.0 * exp / ((exp + 1.0) * (exp + 1.0))
            }
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            Activation::Linear => 0,
            Activation::ReLU => 1,
            Activation::TanH => 2,
            Activation::Sigmoid => 3,
            Activation::PNSigmoid => 4,
        }
    }
}

impl From<u32> for Activation {
    fn from(code: u32) -> Self {
        match code {
            1 => Activation::ReLU,
            2 => Activation::TanH,
            3 => Activation::Sigmoid,
            4 => Activation::PNSigmoid,
            _ => Activation::Linear,
        }
    }
}
